//! Presence maintenance: background retries and TTL eviction.

pub mod reaper;
pub mod retry;

pub use reaper::PresenceReaper;
pub use retry::{RetryPolicy, retry_with_backoff, spawn_retry};
