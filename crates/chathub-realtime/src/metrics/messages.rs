//! Message metrics helpers.

use std::sync::atomic::Ordering;

use super::EngineMetrics;

/// Record a message frame received from a client
pub fn record_received(metrics: &EngineMetrics) {
    metrics.messages_received.fetch_add(1, Ordering::Relaxed);
}

/// Record a frame handed to a local connection
pub fn record_local(metrics: &EngineMetrics) {
    metrics.delivered_local.fetch_add(1, Ordering::Relaxed);
}

/// Record a delivery published to another process
pub fn record_remote(metrics: &EngineMetrics) {
    metrics.delivered_remote.fetch_add(1, Ordering::Relaxed);
}

/// Record a failed per-recipient delivery
pub fn record_failure(metrics: &EngineMetrics) {
    metrics.delivery_failures.fetch_add(1, Ordering::Relaxed);
}

/// Record a delivery that raced a disconnect
pub fn record_race(metrics: &EngineMetrics) {
    metrics.connection_races.fetch_add(1, Ordering::Relaxed);
}
