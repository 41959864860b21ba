//! In-process delivery bus.
//!
//! Lets several engines in one process behave like separate processes
//! sharing a channel. Each process ID gets its own broadcast channel.

use async_trait::async_trait;
use dashmap::DashMap;
use futures::stream::{self, BoxStream, StreamExt};
use tokio::sync::broadcast;
use tracing::{debug, warn};

use chathub_core::result::AppResult;
use chathub_core::types::ProcessId;
use chathub_entity::RemoteDelivery;

use crate::traits::DeliveryBus;

/// Broadcast-channel delivery bus.
#[derive(Debug)]
pub struct MemoryDeliveryBus {
    channels: DashMap<ProcessId, broadcast::Sender<RemoteDelivery>>,
    buffer_size: usize,
}

impl MemoryDeliveryBus {
    /// Create a bus whose per-process channels hold `buffer_size` items.
    pub fn new(buffer_size: usize) -> Self {
        Self {
            channels: DashMap::new(),
            buffer_size: buffer_size.max(1),
        }
    }

    fn sender(&self, process_id: &ProcessId) -> broadcast::Sender<RemoteDelivery> {
        self.channels
            .entry(process_id.clone())
            .or_insert_with(|| broadcast::channel(self.buffer_size).0)
            .clone()
    }
}

#[async_trait]
impl DeliveryBus for MemoryDeliveryBus {
    async fn publish(&self, delivery: &RemoteDelivery) -> AppResult<()> {
        let Some(tx) = self.channels.get(&delivery.process_id).map(|s| s.clone()) else {
            debug!(process_id = %delivery.process_id, "No subscriber for process, dropping delivery");
            return Ok(());
        };

        if tx.send(delivery.clone()).is_err() {
            debug!(process_id = %delivery.process_id, "Subscriber gone, dropping delivery");
        }
        Ok(())
    }

    async fn subscribe(
        &self,
        process_id: &ProcessId,
    ) -> AppResult<BoxStream<'static, RemoteDelivery>> {
        let rx = self.sender(process_id).subscribe();
        let process_id = process_id.clone();

        let stream = stream::unfold(rx, move |mut rx| {
            let process_id = process_id.clone();
            async move {
                loop {
                    match rx.recv().await {
                        Ok(delivery) => return Some((delivery, rx)),
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            warn!(%process_id, skipped, "Delivery bus subscriber lagged");
                        }
                        Err(broadcast::error::RecvError::Closed) => return None,
                    }
                }
            }
        });

        Ok(stream.boxed())
    }
}
