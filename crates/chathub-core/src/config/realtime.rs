//! Real-time WebSocket engine configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Real-time (WebSocket) engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RealtimeConfig {
    /// Maximum live connections per user in one process; the oldest is closed
    /// when a new one would exceed the cap.
    #[serde(default = "default_max_connections_per_user")]
    pub max_connections_per_user: usize,
    /// Outbound buffer per connection.
    #[serde(default = "default_channel_buffer")]
    pub channel_buffer_size: usize,
    /// WebSocket ping interval in seconds.
    #[serde(default = "default_ping_interval")]
    pub ping_interval_seconds: u64,
    /// Seconds of silence after which a connection is considered dead.
    #[serde(default = "default_ping_timeout")]
    pub ping_timeout_seconds: u64,
    /// Maximum size of an inbound text frame in bytes.
    #[serde(default = "default_max_frame")]
    pub max_frame_bytes: usize,
}

impl RealtimeConfig {
    /// Ping interval as a `Duration`, never zero.
    pub fn ping_interval(&self) -> Duration {
        Duration::from_secs(self.ping_interval_seconds.max(1))
    }

    /// Silence tolerated before a connection is closed.
    pub fn ping_timeout(&self) -> Duration {
        Duration::from_secs(self.ping_timeout_seconds.max(1))
    }
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            max_connections_per_user: default_max_connections_per_user(),
            channel_buffer_size: default_channel_buffer(),
            ping_interval_seconds: default_ping_interval(),
            ping_timeout_seconds: default_ping_timeout(),
            max_frame_bytes: default_max_frame(),
        }
    }
}

fn default_max_connections_per_user() -> usize {
    5
}

fn default_channel_buffer() -> usize {
    256
}

fn default_ping_interval() -> u64 {
    30
}

fn default_ping_timeout() -> u64 {
    75
}

fn default_max_frame() -> usize {
    64 * 1024
}
