//! Network module - Listener supervision and per-connection sessions
//!
//! Provides:
//! - Listener for binding a port and accepting connections
//! - Session for driving one connection's read/ack/dispatch/reply cycle
//! - ProbeClient for exercising a server from the command line

mod listener;
mod session;
mod client;

pub use listener::*;
pub use session::*;
pub use client::*;

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::protocol::{DEFAULT_PORT, DEFAULT_READ_TIMEOUT_MS};

/// How a listener treats connections after the first
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AcceptMode {
    /// Accept exactly one connection, serve it, then stop
    Single,
    /// Accept indefinitely, one independent session per connection
    Loop,
}

impl Default for AcceptMode {
    fn default() -> Self {
        AcceptMode::Single
    }
}

/// Configuration for one listening port
#[derive(Debug, Clone)]
pub struct ListenerConfig {
    /// Port to listen on
    pub port: u16,
    /// Interface to bind to
    pub bind_address: String,
    /// Idle timeout for a single read cycle, in milliseconds
    pub read_timeout_ms: u64,
    /// Accept behavior after the first connection
    pub accept_mode: AcceptMode,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            bind_address: "0.0.0.0".to_string(),
            read_timeout_ms: DEFAULT_READ_TIMEOUT_MS,
            accept_mode: AcceptMode::default(),
        }
    }
}

impl ListenerConfig {
    pub fn new(port: u16) -> Self {
        Self {
            port,
            ..Default::default()
        }
    }

    pub fn with_accept_mode(mut self, mode: AcceptMode) -> Self {
        self.accept_mode = mode;
        self
    }

    pub fn with_read_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.read_timeout_ms = timeout_ms;
        self
    }

    /// The read-cycle idle timeout as a Duration
    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }
}
