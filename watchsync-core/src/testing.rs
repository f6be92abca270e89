//! Test doubles shared by the unit tests

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use crate::server::{
    CheckSnapshot, PlaybackSnapshot, RosterEntry, SessionApi, SessionError, SessionId,
};
use crate::session::{current_time_ms, ConnectionStatus, SessionObserver};

/// One recorded server call
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Join(String),
    Leave(String),
    Ready(String, f64),
    Pause(String),
    Time(String, f64),
    Check,
}

/// What the fake answers to the next check
#[derive(Debug, Clone, Copy)]
pub enum CheckReply {
    /// Playing, deadline `lead_ms` after the moment of the reply
    Playing { video_time: f64, lead_ms: i64 },
    Paused { video_time: f64 },
    Fail,
}

#[derive(Debug, Default)]
struct FakeState {
    calls: Vec<Call>,
    check_replies: VecDeque<CheckReply>,
    fallback_reply: Option<CheckReply>,
    check_delay: Duration,
    fail_ready: bool,
    fail_pause: bool,
}

/// Records every call; answers check from a script
#[derive(Debug, Clone, Default)]
pub struct FakeApi {
    state: Arc<Mutex<FakeState>>,
}

impl FakeApi {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a one-off check reply
    pub fn push_check(&self, reply: CheckReply) {
        self.state.lock().check_replies.push_back(reply);
    }

    /// Reply used once the queue is empty
    pub fn set_check_fallback(&self, reply: CheckReply) {
        self.state.lock().fallback_reply = Some(reply);
    }

    /// Hold every check reply back for `delay`
    pub fn set_check_delay(&self, delay: Duration) {
        self.state.lock().check_delay = delay;
    }

    pub fn fail_ready(&self, fail: bool) {
        self.state.lock().fail_ready = fail;
    }

    pub fn fail_pause(&self, fail: bool) {
        self.state.lock().fail_pause = fail;
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state.lock().calls.clone()
    }

    pub fn count(&self, pred: impl Fn(&Call) -> bool) -> usize {
        self.state.lock().calls.iter().filter(|c| pred(c)).count()
    }

    fn record(&self, call: Call) {
        self.state.lock().calls.push(call);
    }
}

fn status_error(operation: &'static str) -> SessionError {
    SessionError::Status {
        operation,
        status: 503,
    }
}

impl SessionApi for FakeApi {
    async fn join(&self, username: &str) -> Result<SessionId, SessionError> {
        self.record(Call::Join(username.to_string()));
        Ok(SessionId::new("7"))
    }

    async fn leave(&self, id: &SessionId) -> Result<(), SessionError> {
        self.record(Call::Leave(id.to_string()));
        Ok(())
    }

    async fn ready(&self, id: &SessionId, video_time: f64) -> Result<(), SessionError> {
        self.record(Call::Ready(id.to_string(), video_time));
        if self.state.lock().fail_ready {
            return Err(status_error("ready"));
        }
        Ok(())
    }

    async fn pause(&self, id: &SessionId) -> Result<(), SessionError> {
        self.record(Call::Pause(id.to_string()));
        if self.state.lock().fail_pause {
            return Err(status_error("pause"));
        }
        Ok(())
    }

    async fn report_time(&self, id: &SessionId, video_time: f64) -> Result<(), SessionError> {
        self.record(Call::Time(id.to_string(), video_time));
        Ok(())
    }

    async fn check(&self) -> Result<CheckSnapshot, SessionError> {
        self.record(Call::Check);
        let delay = self.state.lock().check_delay;
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let reply = {
            let mut state = self.state.lock();
            state.check_replies.pop_front().or(state.fallback_reply)
        };

        let playback = match reply {
            Some(CheckReply::Playing { video_time, lead_ms }) => PlaybackSnapshot::Playing {
                video_time,
                play_deadline_ms: current_time_ms() as f64 + lead_ms as f64,
            },
            Some(CheckReply::Paused { video_time }) => PlaybackSnapshot::Paused { video_time },
            Some(CheckReply::Fail) | None => return Err(status_error("check")),
        };

        Ok(CheckSnapshot {
            clients: vec![RosterEntry {
                username: "alice".to_string(),
                status: "ready".to_string(),
            }],
            playback,
        })
    }
}

/// Observer that keeps everything it was told
#[derive(Debug, Default)]
pub struct RecordingObserver {
    pub statuses: Mutex<Vec<ConnectionStatus>>,
    pub rosters: Mutex<Vec<Vec<RosterEntry>>>,
    pub errors: Mutex<Vec<String>>,
}

impl SessionObserver for RecordingObserver {
    fn on_connection_status(&self, status: ConnectionStatus) {
        self.statuses.lock().push(status);
    }

    fn on_roster(&self, clients: &[RosterEntry]) {
        self.rosters.lock().push(clients.to_vec());
    }

    fn on_error(&self, message: String) {
        self.errors.lock().push(message);
    }
}
