//! WatchSync - Core Library
//!
//! This library keeps one participant's local media player in lock-step with a
//! shared playback timeline coordinated by a remote session server.

pub mod config;
pub mod controller;
pub mod onboarding;
pub mod player;
pub mod poller;
pub mod server;
pub mod session;
pub mod sync;

#[cfg(test)]
pub(crate) mod testing;

// Re-exports for convenience
pub use config::SyncConfig;
pub use controller::PlaybackController;
pub use player::{MediaPlayer, PlayState, SimulatedPlayer};
pub use server::{SessionApi, SessionClient, SessionError, SessionId};
pub use session::{ConnectionStatus, SessionHandle, SessionObserver, SyncSession};
