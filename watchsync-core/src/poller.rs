//! Poller (sync loop)
//!
//! Fetches the authoritative snapshot and decides the single corrective
//! action for it. The fetch runs detached from the session loop; applying the
//! action and re-arming the next cycle is done by the session runtime once the
//! result is back, which keeps cycles strictly sequential.

use std::future::Future;
use std::time::Duration;

use tracing::debug;

use crate::server::{CheckSnapshot, PlaybackSnapshot, RosterEntry, SessionApi, SessionError};
use crate::session::current_time_ms;

/// The corrective action for one snapshot
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Reconciliation {
    /// Seek to `video_time` and play once `delay` has elapsed
    PlayAt {
        video_time: f64,
        deadline_ms: f64,
        delay: Duration,
    },
    /// Make sure the player is paused
    Pause,
}

/// Time left until `deadline_ms`, zero once it has passed
pub fn delay_until(deadline_ms: f64, now_ms: u64) -> Duration {
    let wait_ms = deadline_ms - now_ms as f64;
    if wait_ms.is_finite() && wait_ms > 0.0 {
        Duration::from_secs_f64(wait_ms / 1000.0)
    } else {
        Duration::ZERO
    }
}

/// Decide what to do about `playback` at wall-clock `now_ms`
pub fn reconcile(playback: &PlaybackSnapshot, now_ms: u64) -> Reconciliation {
    match *playback {
        PlaybackSnapshot::Playing {
            video_time,
            play_deadline_ms,
        } => Reconciliation::PlayAt {
            video_time,
            deadline_ms: play_deadline_ms,
            delay: delay_until(play_deadline_ms, now_ms),
        },
        PlaybackSnapshot::Paused { .. } => Reconciliation::Pause,
    }
}

/// Result of one successful poll cycle
#[derive(Debug, Clone, PartialEq)]
pub struct PollOutcome {
    pub clients: Vec<RosterEntry>,
    pub action: Reconciliation,
}

/// Issues check requests and keeps simple cycle statistics
#[derive(Debug)]
pub struct Poller<A> {
    api: A,
    interval: Duration,
    cycles: u64,
    failures: u64,
}

impl<A: SessionApi> Poller<A> {
    pub fn new(api: A, interval: Duration) -> Self {
        Self {
            api,
            interval,
            cycles: 0,
            failures: 0,
        }
    }

    /// Period between the end of one cycle and the start of the next
    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    pub fn failures(&self) -> u64 {
        self.failures
    }

    /// Start a cycle. The returned request owns its own client handle, so it
    /// can run on another task while the caller keeps handling events.
    pub fn fetch(
        &mut self,
    ) -> impl Future<Output = Result<CheckSnapshot, SessionError>> + Send + 'static {
        self.cycles += 1;
        let api = self.api.clone();
        async move { api.check().await }
    }

    /// Finish a cycle with the fetch result
    pub fn complete(
        &mut self,
        fetched: Result<CheckSnapshot, SessionError>,
    ) -> Result<PollOutcome, SessionError> {
        let snapshot = match fetched {
            Ok(snapshot) => snapshot,
            Err(e) => {
                self.failures += 1;
                return Err(e);
            }
        };

        // Measure the deadline against the clock after the response arrived
        let action = reconcile(&snapshot.playback, current_time_ms());
        debug!(
            "Poll #{}: {} clients, {:?}",
            self.cycles,
            snapshot.clients.len(),
            action
        );

        Ok(PollOutcome {
            clients: snapshot.clients,
            action,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{CheckReply, FakeApi};

    #[test]
    fn test_delay_until_future_deadline() {
        assert_eq!(delay_until(15_000.0, 10_000), Duration::from_millis(5000));
    }

    #[test]
    fn test_delay_until_past_deadline_is_immediate() {
        assert_eq!(delay_until(9_900.0, 10_000), Duration::ZERO);
        assert_eq!(delay_until(10_000.0, 10_000), Duration::ZERO);
        assert_eq!(delay_until(f64::NAN, 10_000), Duration::ZERO);
    }

    #[test]
    fn test_reconcile() {
        let playing = PlaybackSnapshot::Playing {
            video_time: 4.0,
            play_deadline_ms: 12_000.0,
        };
        assert_eq!(
            reconcile(&playing, 10_000),
            Reconciliation::PlayAt {
                video_time: 4.0,
                deadline_ms: 12_000.0,
                delay: Duration::from_millis(2000),
            }
        );

        let paused = PlaybackSnapshot::Paused { video_time: 4.0 };
        assert_eq!(reconcile(&paused, 10_000), Reconciliation::Pause);
    }

    #[tokio::test]
    async fn test_poll_counts_failures() {
        let api = FakeApi::new();
        api.push_check(CheckReply::Fail);
        api.push_check(CheckReply::Paused { video_time: 1.0 });
        let mut poller = Poller::new(api, Duration::from_millis(3000));

        let fetched = poller.fetch().await;
        assert!(poller.complete(fetched).is_err());
        let fetched = poller.fetch().await;
        let outcome = poller.complete(fetched).unwrap();
        assert_eq!(outcome.action, Reconciliation::Pause);
        assert_eq!(outcome.clients.len(), 1);
        assert_eq!(poller.cycles(), 2);
        assert_eq!(poller.failures(), 1);
    }

    #[tokio::test]
    async fn test_poll_playing_has_pending_delay() {
        let api = FakeApi::new();
        api.push_check(CheckReply::Playing {
            video_time: 0.0,
            lead_ms: 5000,
        });
        let mut poller = Poller::new(api, Duration::from_millis(3000));

        let fetched = poller.fetch().await;
        match poller.complete(fetched).unwrap().action {
            Reconciliation::PlayAt { delay, .. } => {
                assert!(delay <= Duration::from_millis(5000));
                assert!(delay > Duration::from_millis(4000));
            }
            other => panic!("expected PlayAt, got {:?}", other),
        }
    }
}
