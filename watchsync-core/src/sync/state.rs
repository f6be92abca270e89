//! Connection State Management

use crate::server::SessionId;

/// What this client knows about its own membership in the session
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConnectionState {
    /// Issued by the server on join
    pub session_id: Option<SessionId>,
    /// Set once join succeeds, never reset
    pub connected: bool,
    /// Paused at a known position and waiting for the server to resume us
    pub ready: bool,
    /// Whether the poll loop should keep re-arming itself
    pub polling: bool,
}

impl ConnectionState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a successful join
    pub fn mark_joined(&mut self, id: SessionId) {
        self.session_id = Some(id);
        self.connected = true;
    }

    /// The session id, but only while connected
    pub fn active_id(&self) -> Option<&SessionId> {
        if self.connected {
            self.session_id.as_ref()
        } else {
            None
        }
    }
}
