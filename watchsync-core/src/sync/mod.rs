//! Sync State
//!
//! Echo suppression latches and the per-session connection record.

mod guard;
mod state;

pub use guard::*;
pub use state::*;
