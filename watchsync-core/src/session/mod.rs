//! Session runtime
//!
//! Runs the controller, the poller and their timers on one task.

mod runtime;
mod types;

pub use runtime::*;
pub use types::*;
