//! Playback Controller
//!
//! Turns raw player notifications into either a suppressed echo or a user
//! intent, and drives the player when the server says so. Clients never start
//! playing on their own: a user play is immediately undone and turned into a
//! ready declaration, and the actual play arrives later via reconciliation.
//!
//! The controller never waits on the network. Server calls it decides on are
//! queued as [`ServerRequest`]s for the session runtime to deliver, and their
//! outcomes come back through [`PlaybackController::ready_completed`].

use tracing::{debug, info};

use crate::player::MediaPlayer;
use crate::server::{SessionApi, SessionError, SessionId};
use crate::sync::{ConnectionState, EchoGuard};

/// What a play notification turned out to be
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayObserved {
    /// Caused by our own `play()`
    Echo,
    /// User play while already ready; nothing to report
    AlreadyReady,
    /// User play while a ready declaration is still in flight
    ReadyPending,
    /// No session yet, the play was only undone
    NotConnected,
    /// A ready declaration was queued
    DeclaredReady,
}

/// What a pause notification turned out to be
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PauseObserved {
    /// Caused by our own `pause()`
    Echo,
    /// A user pause, queued for the server
    UserPause,
    NotConnected,
}

/// A server call decided on by the controller
#[derive(Debug, Clone, PartialEq)]
pub enum ServerRequest {
    Ready {
        id: SessionId,
        video_time: f64,
        /// Matches the reply to the declaration that is still current
        attempt: u64,
    },
    Pause {
        id: SessionId,
    },
    Time {
        id: SessionId,
        video_time: f64,
    },
    Leave {
        id: SessionId,
    },
}

impl ServerRequest {
    pub fn operation(&self) -> &'static str {
        match self {
            ServerRequest::Ready { .. } => "ready",
            ServerRequest::Pause { .. } => "pause",
            ServerRequest::Time { .. } => "time",
            ServerRequest::Leave { .. } => "leave",
        }
    }

    /// Issue the request against `api`
    pub async fn send<A: SessionApi>(&self, api: &A) -> Result<(), SessionError> {
        match self {
            ServerRequest::Ready { id, video_time, .. } => api.ready(id, *video_time).await,
            ServerRequest::Pause { id } => api.pause(id).await,
            ServerRequest::Time { id, video_time } => api.report_time(id, *video_time).await,
            ServerRequest::Leave { id } => api.leave(id).await,
        }
    }
}

/// Owns the player, the connection record and the echo guard
pub struct PlaybackController<P> {
    player: P,
    state: ConnectionState,
    guard: EchoGuard,
    /// Attempt number of the ready declaration awaiting its reply
    pending_ready: Option<u64>,
    ready_attempts: u64,
    outbox: Vec<ServerRequest>,
}

impl<P: MediaPlayer> PlaybackController<P> {
    pub fn new(player: P) -> Self {
        Self {
            player,
            state: ConnectionState::new(),
            guard: EchoGuard::new(),
            pending_ready: None,
            ready_attempts: 0,
            outbox: Vec::new(),
        }
    }

    pub fn state(&self) -> &ConnectionState {
        &self.state
    }

    pub(crate) fn state_mut(&mut self) -> &mut ConnectionState {
        &mut self.state
    }

    pub fn guard(&self) -> &EchoGuard {
        &self.guard
    }

    /// Drain the requests queued since the last call, oldest first
    pub fn take_requests(&mut self) -> Vec<ServerRequest> {
        std::mem::take(&mut self.outbox)
    }

    /// Record the id the server issued on join
    pub fn joined(&mut self, id: SessionId) {
        info!("Joined session with id {}", id);
        self.state.mark_joined(id);
    }

    /// Stop polling and queue a leave request. Returns whether one was queued.
    pub fn leave(&mut self) -> bool {
        self.state.polling = false;
        self.pending_ready = None;

        let Some(id) = self.state.active_id().cloned() else {
            return false;
        };
        self.outbox.push(ServerRequest::Leave { id });
        true
    }

    /// Handle a play notification from the player
    pub fn on_play_observed(&mut self) -> PlayObserved {
        if self.guard.consume_expected_play() {
            debug!("Suppressed play echo");
            return PlayObserved::Echo;
        }

        // Nobody plays before the server says so
        self.force_pause();

        if self.state.ready {
            debug!("Play while already ready, waiting for the server");
            return PlayObserved::AlreadyReady;
        }
        if self.pending_ready.is_some() {
            debug!("Play while ready is in flight");
            return PlayObserved::ReadyPending;
        }

        self.declare_ready()
    }

    /// Handle a pause notification from the player
    pub fn on_pause_observed(&mut self) -> PauseObserved {
        // Echoed pauses are still valid checkpoints
        self.report_time();

        if self.guard.consume_expected_pause() {
            debug!("Suppressed pause echo");
            return PauseObserved::Echo;
        }

        self.declare_pause()
    }

    /// Queue a ready declaration at the current position
    pub fn declare_ready(&mut self) -> PlayObserved {
        let Some(id) = self.state.active_id().cloned() else {
            debug!("Not connected, not declaring ready");
            return PlayObserved::NotConnected;
        };

        let video_time = self.player.current_time();
        self.ready_attempts += 1;
        self.pending_ready = Some(self.ready_attempts);
        debug!("Declaring ready at {:.3}s", video_time);

        self.outbox.push(ServerRequest::Ready {
            id,
            video_time,
            attempt: self.ready_attempts,
        });
        PlayObserved::DeclaredReady
    }

    /// Apply the server's answer to ready declaration `attempt`. Returns
    /// whether this client just became ready. Replies to a declaration that a
    /// later pause or leave superseded are ignored.
    pub fn ready_completed(&mut self, attempt: u64, result: &Result<(), SessionError>) -> bool {
        if self.pending_ready != Some(attempt) {
            debug!("Ignoring reply to superseded ready #{}", attempt);
            return false;
        }
        self.pending_ready = None;

        if result.is_err() {
            return false;
        }

        info!("Server accepted ready #{}", attempt);
        self.state.ready = true;
        true
    }

    /// Queue a user pause. Local readiness is dropped at once, whatever the
    /// server answers: the user did pause.
    pub fn declare_pause(&mut self) -> PauseObserved {
        let Some(id) = self.state.active_id().cloned() else {
            return PauseObserved::NotConnected;
        };

        info!("User paused at {:.3}s", self.player.current_time());
        self.outbox.push(ServerRequest::Pause { id });
        self.state.ready = false;
        self.pending_ready = None;
        self.guard.clear_expected_play();
        PauseObserved::UserPause
    }

    /// Queue a report of the current position. No-op while disconnected.
    pub fn report_time(&mut self) {
        let Some(id) = self.state.active_id().cloned() else {
            return;
        };

        let video_time = self.player.current_time();
        self.outbox.push(ServerRequest::Time { id, video_time });
    }

    /// Pause the player on our own behalf. Returns whether the player was
    /// touched.
    pub fn force_pause(&mut self) -> bool {
        if self.player.is_paused() {
            return false;
        }

        self.guard.mark_expected_pause();
        self.player.pause();
        true
    }

    /// Seek to `video_time` and play, unless already playing. Called when the
    /// server's play deadline is reached.
    pub fn schedule_force_play(&mut self, video_time: f64, deadline_ms: f64) -> bool {
        let player = &self.player;
        if player.current_time() > 0.0 && !player.is_paused() && !player.is_ended() {
            debug!("Already playing, ignoring deadline {}", deadline_ms);
            return false;
        }

        info!("Deadline {} reached, playing from {:.3}s", deadline_ms, video_time);
        self.player.set_current_time(video_time);
        self.guard.mark_expected_play();
        self.player.play();
        true
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::player::{notification_channel, PlayState, PlayerEvents, SimulatedPlayer};
    use crate::testing::{Call, FakeApi};

    struct Harness {
        controller: PlaybackController<SimulatedPlayer>,
        player: SimulatedPlayer,
        events: PlayerEvents,
    }

    fn harness(connected: bool) -> Harness {
        let (notifier, events) = notification_channel();
        let player = SimulatedPlayer::new(100.0, notifier);
        let mut controller = PlaybackController::new(player.clone());
        if connected {
            controller.joined(SessionId::new("7"));
        }
        Harness {
            controller,
            player,
            events,
        }
    }

    fn id() -> SessionId {
        SessionId::new("7")
    }

    fn ready_attempt(requests: &[ServerRequest]) -> u64 {
        match requests {
            [ServerRequest::Ready { attempt, .. }] => *attempt,
            other => panic!("expected a single ready, got {:?}", other),
        }
    }

    fn unavailable() -> Result<(), SessionError> {
        Err(SessionError::Status {
            operation: "ready",
            status: 503,
        })
    }

    #[tokio::test(start_paused = true)]
    async fn test_joined_records_session() {
        let mut h = harness(true);
        assert!(h.controller.state().connected);
        assert_eq!(h.controller.state().active_id(), Some(&id()));
        assert!(h.controller.take_requests().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_force_pause_echo_is_suppressed() {
        let mut h = harness(true);
        let mut player = h.player.clone();
        player.play();
        assert_eq!(h.events.try_recv(), Some(PlayState::Playing));
        tokio::time::advance(Duration::from_secs(3)).await;

        assert!(h.controller.force_pause());
        assert!(h.controller.guard().allows_pause());
        assert_eq!(h.events.try_recv(), Some(PlayState::Paused));

        assert_eq!(h.controller.on_pause_observed(), PauseObserved::Echo);
        assert!(!h.controller.guard().allows_pause());
        assert_eq!(
            h.controller.take_requests(),
            vec![ServerRequest::Time {
                id: id(),
                video_time: 3.0
            }]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_force_pause_when_paused_is_noop() {
        let mut h = harness(true);
        assert!(!h.controller.force_pause());
        assert_eq!(h.player.pause_calls(), 0);
        assert_eq!(h.controller.guard(), &EchoGuard::default());
        assert_eq!(h.events.try_recv(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_force_play_when_playing_is_noop() {
        let mut h = harness(true);
        let mut player = h.player.clone();
        player.play();
        tokio::time::advance(Duration::from_millis(500)).await;
        h.events.try_recv();

        assert!(!h.controller.schedule_force_play(0.0, 0.0));
        assert_eq!(h.player.play_calls(), 1);
        assert!(!h.controller.guard().allows_play());
        assert!(h.player.current_time() > 0.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_force_play_seeks_and_marks_latch() {
        let mut h = harness(true);
        assert!(h.controller.schedule_force_play(12.0, 1000.0));
        assert!(!h.player.is_paused());
        assert_eq!(h.player.current_time(), 12.0);
        assert!(h.controller.guard().allows_play());

        assert_eq!(h.events.try_recv(), Some(PlayState::Playing));
        assert_eq!(h.controller.on_play_observed(), PlayObserved::Echo);
        assert!(!h.player.is_paused());
        assert!(h.controller.take_requests().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_user_play_declares_ready() {
        let mut h = harness(true);
        let mut player = h.player.clone();
        player.play();
        assert_eq!(h.events.try_recv(), Some(PlayState::Playing));

        assert_eq!(h.controller.on_play_observed(), PlayObserved::DeclaredReady);
        assert!(h.player.is_paused());
        assert!(h.controller.guard().allows_pause());
        let attempt = ready_attempt(&h.controller.take_requests());

        // Not ready until the server says so
        assert!(!h.controller.state().ready);
        assert!(h.controller.ready_completed(attempt, &Ok(())));
        assert!(h.controller.state().ready);

        // The undo shows up as an echo
        assert_eq!(h.events.try_recv(), Some(PlayState::Paused));
        assert_eq!(h.controller.on_pause_observed(), PauseObserved::Echo);
        assert!(h.controller.state().ready);
    }

    #[tokio::test(start_paused = true)]
    async fn test_play_while_ready_does_not_redeclare() {
        let mut h = harness(true);
        let mut player = h.player.clone();

        player.play();
        h.controller.on_play_observed();
        let attempt = ready_attempt(&h.controller.take_requests());

        // Still waiting for the reply
        player.play();
        assert_eq!(h.controller.on_play_observed(), PlayObserved::ReadyPending);
        assert!(h.controller.take_requests().is_empty());

        h.controller.ready_completed(attempt, &Ok(()));
        player.play();
        assert_eq!(h.controller.on_play_observed(), PlayObserved::AlreadyReady);
        assert!(h.player.is_paused());
        assert!(h.controller.take_requests().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_user_pause_reports_time_then_pause() {
        let mut h = harness(true);
        h.controller.state_mut().ready = true;

        let mut player = h.player.clone();
        player.set_current_time(42.5);
        h.controller.schedule_force_play(42.5, 0.0);
        h.controller.on_play_observed();
        player.pause();

        assert_eq!(h.controller.on_pause_observed(), PauseObserved::UserPause);
        assert!(!h.controller.state().ready);
        assert_eq!(
            h.controller.take_requests(),
            vec![
                ServerRequest::Time {
                    id: id(),
                    video_time: 42.5
                },
                ServerRequest::Pause { id: id() },
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_user_pause_clears_play_latch() {
        let mut h = harness(true);
        h.controller.guard.mark_expected_play();
        assert_eq!(h.controller.declare_pause(), PauseObserved::UserPause);
        assert!(!h.controller.guard().allows_play());
    }

    #[tokio::test(start_paused = true)]
    async fn test_pause_supersedes_pending_ready() {
        let mut h = harness(true);
        h.controller.declare_ready();
        let attempt = ready_attempt(&h.controller.take_requests());

        h.controller.declare_pause();
        assert!(!h.controller.ready_completed(attempt, &Ok(())));
        assert!(!h.controller.state().ready);
    }

    #[tokio::test(start_paused = true)]
    async fn test_disconnected_calls_are_noops() {
        let mut h = harness(false);
        let mut player = h.player.clone();

        player.play();
        assert_eq!(h.controller.on_play_observed(), PlayObserved::NotConnected);
        assert!(h.player.is_paused());
        assert!(!h.controller.state().ready);
        assert_eq!(h.controller.on_pause_observed(), PauseObserved::Echo);

        assert_eq!(h.controller.declare_pause(), PauseObserved::NotConnected);
        assert!(!h.controller.leave());
        assert!(h.controller.take_requests().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_ready_keeps_client_unready() {
        let mut h = harness(true);
        let mut player = h.player.clone();

        player.play();
        h.controller.on_play_observed();
        let attempt = ready_attempt(&h.controller.take_requests());
        assert!(!h.controller.ready_completed(attempt, &unavailable()));
        assert!(!h.controller.state().ready);

        // A later play tries again
        player.play();
        assert_eq!(h.controller.on_play_observed(), PlayObserved::DeclaredReady);
        let retry = ready_attempt(&h.controller.take_requests());
        assert!(retry > attempt);
        assert!(h.controller.ready_completed(retry, &Ok(())));
    }

    #[tokio::test(start_paused = true)]
    async fn test_leave_stops_polling() {
        let mut h = harness(true);
        h.controller.state_mut().polling = true;

        assert!(h.controller.leave());
        assert!(!h.controller.state().polling);
        assert_eq!(
            h.controller.take_requests(),
            vec![ServerRequest::Leave { id: id() }]
        );
    }

    #[tokio::test]
    async fn test_requests_map_to_api_calls() {
        let api = FakeApi::new();
        let requests = [
            ServerRequest::Ready {
                id: id(),
                video_time: 1.5,
                attempt: 1,
            },
            ServerRequest::Time {
                id: id(),
                video_time: 2.0,
            },
            ServerRequest::Pause { id: id() },
            ServerRequest::Leave { id: id() },
        ];
        for request in &requests {
            request.send(&api).await.unwrap();
        }

        assert_eq!(
            api.calls(),
            vec![
                Call::Ready("7".to_string(), 1.5),
                Call::Time("7".to_string(), 2.0),
                Call::Pause("7".to_string()),
                Call::Leave("7".to_string()),
            ]
        );
        assert_eq!(requests[2].operation(), "pause");
    }
}
