//! Headless player
//!
//! Tracks a playback position against the tokio clock, so it behaves like a
//! real element without decoding anything. Cloning shares the same player.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::time::Instant;
use tracing::debug;

use super::{MediaPlayer, PlayState, PlayerNotifier};

#[derive(Debug)]
struct Inner {
    duration: f64,
    /// Position at `resumed_at`, or the frozen position while paused
    position: f64,
    /// Set while playing
    resumed_at: Option<Instant>,
    ended: bool,
    play_calls: u32,
    pause_calls: u32,
}

impl Inner {
    fn position_now(&self) -> f64 {
        match self.resumed_at {
            Some(at) => (self.position + at.elapsed().as_secs_f64()).min(self.duration),
            None => self.position,
        }
    }
}

/// A player with a fixed duration and no media behind it
#[derive(Debug, Clone)]
pub struct SimulatedPlayer {
    inner: Arc<Mutex<Inner>>,
    notifier: PlayerNotifier,
}

impl SimulatedPlayer {
    /// Create a paused player at position 0
    pub fn new(duration_secs: f64, notifier: PlayerNotifier) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                duration: duration_secs.max(0.0),
                position: 0.0,
                resumed_at: None,
                ended: false,
                play_calls: 0,
                pause_calls: 0,
            })),
            notifier,
        }
    }

    pub fn duration(&self) -> f64 {
        self.inner.lock().duration
    }

    /// Detect end of stream; emits a pause notification when it is reached
    pub fn refresh(&self) {
        let reached_end = {
            let mut inner = self.inner.lock();
            if inner.resumed_at.is_some() && inner.position_now() >= inner.duration {
                inner.position = inner.duration;
                inner.resumed_at = None;
                inner.ended = true;
                true
            } else {
                false
            }
        };

        if reached_end {
            debug!("Simulated player reached end of stream");
            self.notifier.on_play_state_changed(PlayState::Paused);
        }
    }

    /// Number of `play()` calls that actually started playback
    pub fn play_calls(&self) -> u32 {
        self.inner.lock().play_calls
    }

    /// Number of `pause()` calls that actually stopped playback
    pub fn pause_calls(&self) -> u32 {
        self.inner.lock().pause_calls
    }
}

impl MediaPlayer for SimulatedPlayer {
    fn current_time(&self) -> f64 {
        self.inner.lock().position_now()
    }

    fn set_current_time(&mut self, seconds: f64) {
        let mut inner = self.inner.lock();
        let target = seconds.clamp(0.0, inner.duration);
        inner.position = target;
        inner.ended = false;
        if inner.resumed_at.is_some() {
            inner.resumed_at = Some(Instant::now());
        }
    }

    fn is_paused(&self) -> bool {
        self.inner.lock().resumed_at.is_none()
    }

    fn is_ended(&self) -> bool {
        let inner = self.inner.lock();
        inner.ended || (inner.resumed_at.is_some() && inner.position_now() >= inner.duration)
    }

    fn play(&mut self) {
        {
            let mut inner = self.inner.lock();
            if inner.resumed_at.is_some() {
                return;
            }
            if inner.ended {
                inner.position = 0.0;
                inner.ended = false;
            }
            inner.resumed_at = Some(Instant::now());
            inner.play_calls += 1;
        }
        self.notifier.on_play_state_changed(PlayState::Playing);
    }

    fn pause(&mut self) {
        {
            let mut inner = self.inner.lock();
            if inner.resumed_at.is_none() {
                return;
            }
            inner.position = inner.position_now();
            inner.resumed_at = None;
            inner.pause_calls += 1;
        }
        self.notifier.on_play_state_changed(PlayState::Paused);
    }
}
