//! Session status and observer types

use crate::server::RosterEntry;

/// Connection progress as shown to the user
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionStatus {
    Connecting,
    Connected,
    Failed(String),
    Left,
}

impl std::fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConnectionStatus::Connecting => write!(f, "Connecting..."),
            ConnectionStatus::Connected => write!(f, "Connected"),
            ConnectionStatus::Failed(reason) => write!(f, "Failed ({})", reason),
            ConnectionStatus::Left => write!(f, "Left"),
        }
    }
}

/// Callback interface for session events
pub trait SessionObserver: Send + Sync {
    fn on_connection_status(&self, status: ConnectionStatus);

    /// Called after every successful poll with the full roster
    fn on_roster(&self, clients: &[RosterEntry]);

    /// A contained failure; the session keeps running
    fn on_error(&self, _message: String) {}
}

/// Get current time in milliseconds since UNIX epoch
pub fn current_time_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
