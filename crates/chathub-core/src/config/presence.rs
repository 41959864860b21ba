//! Presence store TTL and heartbeat configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Presence TTL, heartbeat, and retry settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PresenceConfig {
    /// Entries not refreshed within this many seconds are evicted.
    #[serde(default = "default_ttl")]
    pub ttl_seconds: u64,
    /// How often each live connection refreshes its presence entry.
    #[serde(default = "default_heartbeat_interval")]
    pub heartbeat_interval_seconds: u64,
    /// How often the reaper sweeps expired entries.
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_seconds: u64,
    /// Initial delay before retrying a failed store operation, in milliseconds.
    #[serde(default = "default_retry_initial")]
    pub retry_initial_backoff_ms: u64,
    /// Upper bound on the retry delay, in milliseconds.
    #[serde(default = "default_retry_max")]
    pub retry_max_backoff_ms: u64,
    /// Attempts before a background retry gives up and leaves it to the TTL.
    #[serde(default = "default_retry_attempts")]
    pub retry_max_attempts: u32,
}

impl PresenceConfig {
    /// Presence TTL as a `Duration`.
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_seconds)
    }

    /// Heartbeat interval as a `Duration`.
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_seconds.max(1))
    }

    /// Reaper sweep interval as a `Duration`.
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_seconds.max(1))
    }
}

impl Default for PresenceConfig {
    fn default() -> Self {
        Self {
            ttl_seconds: default_ttl(),
            heartbeat_interval_seconds: default_heartbeat_interval(),
            sweep_interval_seconds: default_sweep_interval(),
            retry_initial_backoff_ms: default_retry_initial(),
            retry_max_backoff_ms: default_retry_max(),
            retry_max_attempts: default_retry_attempts(),
        }
    }
}

fn default_ttl() -> u64 {
    90
}

fn default_heartbeat_interval() -> u64 {
    30
}

fn default_sweep_interval() -> u64 {
    30
}

fn default_retry_initial() -> u64 {
    200
}

fn default_retry_max() -> u64 {
    10_000
}

fn default_retry_attempts() -> u32 {
    8
}
