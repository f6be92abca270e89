//! Session Server API
//!
//! This module provides the request layer for the remote session server.

mod client;
mod types;

pub use client::{SessionApi, SessionClient, SessionError};
pub use types::*;
