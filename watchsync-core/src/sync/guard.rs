//! Echo guard
//!
//! Marks "the next player transition was caused by us". Every programmatic
//! `play()`/`pause()` must mark the matching latch before calling the player,
//! and the next notification of that kind consumes it.

use tracing::warn;

/// Two single-use latches, at most one of which is set at a time
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct EchoGuard {
    allow_play: bool,
    allow_pause: bool,
}

impl EchoGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Expect the next play notification to be our own
    pub fn mark_expected_play(&mut self) {
        if std::mem::take(&mut self.allow_pause) {
            warn!("Dropping unconsumed pause latch before programmatic play");
        }
        self.allow_play = true;
    }

    /// Expect the next pause notification to be our own
    pub fn mark_expected_pause(&mut self) {
        if std::mem::take(&mut self.allow_play) {
            warn!("Dropping unconsumed play latch before programmatic pause");
        }
        self.allow_pause = true;
    }

    /// Test-and-clear the play latch
    pub fn consume_expected_play(&mut self) -> bool {
        std::mem::take(&mut self.allow_play)
    }

    /// Test-and-clear the pause latch
    pub fn consume_expected_pause(&mut self) -> bool {
        std::mem::take(&mut self.allow_pause)
    }

    /// Forget a pending play allowance (user paused again)
    pub fn clear_expected_play(&mut self) {
        self.allow_play = false;
    }

    pub fn allows_play(&self) -> bool {
        self.allow_play
    }

    pub fn allows_pause(&self) -> bool {
        self.allow_pause
    }
}
