//! Realtime engine metrics.

pub mod connections;
pub mod messages;

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

/// Engine-level metrics counters.
#[derive(Debug, Default)]
pub struct EngineMetrics {
    /// Total connections established
    pub connections_total: AtomicU64,
    /// Connections currently active
    pub connections_active: AtomicU64,
    /// Connections rejected at authentication
    pub auth_failures: AtomicU64,
    /// Message frames received from clients
    pub messages_received: AtomicU64,
    /// Frames handed to local connections
    pub delivered_local: AtomicU64,
    /// Deliveries published to other processes
    pub delivered_remote: AtomicU64,
    /// Per-recipient delivery failures
    pub delivery_failures: AtomicU64,
    /// Deliveries to connections that closed mid-flight
    pub connection_races: AtomicU64,
    /// Presence operations retried in the background
    pub presence_retries: AtomicU64,
    /// Presence entries evicted by TTL
    pub presence_evicted: AtomicU64,
}

impl EngineMetrics {
    /// Create new zeroed metrics
    pub fn new() -> Self {
        Self::default()
    }

    /// Get a snapshot of all metrics
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            connections_total: self.connections_total.load(Ordering::Relaxed),
            connections_active: self.connections_active.load(Ordering::Relaxed),
            auth_failures: self.auth_failures.load(Ordering::Relaxed),
            messages_received: self.messages_received.load(Ordering::Relaxed),
            delivered_local: self.delivered_local.load(Ordering::Relaxed),
            delivered_remote: self.delivered_remote.load(Ordering::Relaxed),
            delivery_failures: self.delivery_failures.load(Ordering::Relaxed),
            connection_races: self.connection_races.load(Ordering::Relaxed),
            presence_retries: self.presence_retries.load(Ordering::Relaxed),
            presence_evicted: self.presence_evicted.load(Ordering::Relaxed),
        }
    }
}

/// Serializable metrics snapshot
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    /// Total connections ever established
    pub connections_total: u64,
    /// Currently active connections
    pub connections_active: u64,
    /// Connections rejected at authentication
    pub auth_failures: u64,
    /// Message frames received
    pub messages_received: u64,
    /// Frames handed to local connections
    pub delivered_local: u64,
    /// Deliveries published to other processes
    pub delivered_remote: u64,
    /// Per-recipient delivery failures
    pub delivery_failures: u64,
    /// Deliveries that raced a disconnect
    pub connection_races: u64,
    /// Background presence retries
    pub presence_retries: u64,
    /// Presence entries evicted by TTL
    pub presence_evicted: u64,
}
