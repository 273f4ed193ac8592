//! Transport Configuration
//!
//! Endpoint and recovery settings for the duplex connection.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default WebSocket endpoint of the generation service
pub const DEFAULT_WS_URL: &str = "ws://localhost:8000/ws";

/// Default delay before a reconnection attempt
pub const DEFAULT_RECONNECT_DELAY_MS: u64 = 5000;

/// Default bound on a single connection attempt
pub const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 5000;

/// Transport configuration
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransportConfig {
    /// WebSocket URL of the peer
    pub ws_url: String,

    /// Connection timeout in milliseconds
    ///
    /// A timed-out attempt counts as a failure and schedules a reconnect.
    pub connect_timeout_ms: u64,

    /// Fixed delay between a detected disconnect and the next attempt
    pub reconnect_delay_ms: u64,

    /// Consecutive failed attempts before giving up (0 = never give up)
    pub max_reconnect_attempts: u32,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            ws_url: DEFAULT_WS_URL.to_string(),
            connect_timeout_ms: DEFAULT_CONNECT_TIMEOUT_MS,
            reconnect_delay_ms: DEFAULT_RECONNECT_DELAY_MS,
            max_reconnect_attempts: 0,
        }
    }
}

impl TransportConfig {
    /// Configuration for a specific endpoint with default recovery settings
    pub fn for_url(ws_url: impl Into<String>) -> Self {
        Self {
            ws_url: ws_url.into(),
            ..Default::default()
        }
    }

    /// Reconnection delay as a `Duration`
    #[must_use]
    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }

    /// Connect timeout as a `Duration`
    #[must_use]
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    /// Whether the reconnection loop is unbounded
    #[must_use]
    pub fn reconnects_forever(&self) -> bool {
        self.max_reconnect_attempts == 0
    }
}
