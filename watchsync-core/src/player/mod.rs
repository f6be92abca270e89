//! Media player abstraction
//!
//! The core never decodes or renders media. It drives whatever implements
//! [`MediaPlayer`] and learns about state changes through a [`PlayerNotifier`].

mod simulated;

pub use simulated::SimulatedPlayer;

use tokio::sync::mpsc;
use tracing::trace;

/// Playing state carried by a player notification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayState {
    Playing,
    Paused,
}

/// The player surface the controller relies on.
///
/// Implementations must report every change of playing state, whatever caused
/// it, through the [`PlayerNotifier`] they were created with.
pub trait MediaPlayer: Send + 'static {
    /// Current position in seconds
    fn current_time(&self) -> f64;

    /// Seek to `seconds`
    fn set_current_time(&mut self, seconds: f64);

    fn is_paused(&self) -> bool;

    fn is_ended(&self) -> bool;

    fn play(&mut self);

    fn pause(&mut self);
}

/// Sending half handed to the player implementation
#[derive(Debug, Clone)]
pub struct PlayerNotifier {
    tx: mpsc::UnboundedSender<PlayState>,
}

impl PlayerNotifier {
    /// Called by the player whenever its playing state changed
    pub fn on_play_state_changed(&self, state: PlayState) {
        if self.tx.send(state).is_err() {
            trace!("Dropping {:?} notification, session has stopped", state);
        }
    }
}

/// Receiving half consumed by the session runtime
#[derive(Debug)]
pub struct PlayerEvents {
    rx: mpsc::UnboundedReceiver<PlayState>,
}

impl PlayerEvents {
    pub async fn recv(&mut self) -> Option<PlayState> {
        self.rx.recv().await
    }

    /// Take a notification that is already queued, if any
    pub fn try_recv(&mut self) -> Option<PlayState> {
        self.rx.try_recv().ok()
    }
}

/// Create a connected notifier/receiver pair
pub fn notification_channel() -> (PlayerNotifier, PlayerEvents) {
    let (tx, rx) = mpsc::unbounded_channel();
    (PlayerNotifier { tx }, PlayerEvents { rx })
}
