//! Periodic eviction of expired presence entries.
//!
//! Lookups already ignore expired entries; the reaper reclaims the space
//! left behind by processes that died without cleaning up.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use chathub_core::result::AppResult;
use chathub_store::PresenceStore;

use crate::metrics::{EngineMetrics, connections};

/// Sweeps the presence store on a fixed interval.
#[derive(Debug, Clone)]
pub struct PresenceReaper {
    presence: Arc<dyn PresenceStore>,
    metrics: Arc<EngineMetrics>,
    interval: Duration,
}

impl PresenceReaper {
    /// Creates a reaper sweeping every `interval`.
    pub fn new(
        presence: Arc<dyn PresenceStore>,
        metrics: Arc<EngineMetrics>,
        interval: Duration,
    ) -> Self {
        Self {
            presence,
            metrics,
            interval,
        }
    }

    /// Runs one sweep. Returns the number of entries evicted.
    pub async fn sweep(&self) -> AppResult<u64> {
        let evicted = self.presence.evict_expired().await?;
        if evicted > 0 {
            info!(count = evicted, "Evicted expired presence entries");
            connections::record_evicted(&self.metrics, evicted);
        }
        Ok(evicted)
    }

    /// Sweeps until `cancel` fires.
    pub async fn run(self, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        // The first tick completes immediately.
        ticker.tick().await;

        loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => {
                    debug!("Presence reaper stopped");
                    break;
                }
                _ = ticker.tick() => {
                    if let Err(e) = self.sweep().await {
                        error!(error = %e, "Presence sweep failed");
                    }
                }
            }
        }
    }
}
