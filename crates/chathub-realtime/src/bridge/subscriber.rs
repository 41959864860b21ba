//! Cross-process delivery subscriber.
//!
//! Every process listens on its own channel of the delivery bus and hands
//! incoming envelopes to the router for local delivery. When the stream
//! ends (the store dropped the subscription) it resubscribes with backoff.

use std::sync::Arc;

use futures::StreamExt;
use futures::stream::BoxStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use chathub_core::result::AppResult;
use chathub_core::types::ProcessId;
use chathub_entity::RemoteDelivery;
use chathub_store::DeliveryBus;

use crate::presence::RetryPolicy;
use crate::router::FanoutRouter;

/// Relays deliveries addressed to this process into the local router.
#[derive(Debug, Clone)]
pub struct DeliverySubscriber {
    process_id: ProcessId,
    bus: Arc<dyn DeliveryBus>,
    router: Arc<FanoutRouter>,
    backoff: RetryPolicy,
}

impl DeliverySubscriber {
    /// Creates a subscriber for `process_id`.
    pub fn new(
        process_id: ProcessId,
        bus: Arc<dyn DeliveryBus>,
        router: Arc<FanoutRouter>,
        backoff: RetryPolicy,
    ) -> Self {
        Self {
            process_id,
            bus,
            router,
            backoff,
        }
    }

    /// Open the subscription.
    ///
    /// Done before the engine accepts connections so no delivery published
    /// to this process after startup is missed.
    pub async fn subscribe(&self) -> AppResult<BoxStream<'static, RemoteDelivery>> {
        let stream = self.bus.subscribe(&self.process_id).await?;
        info!(process_id = %self.process_id, "Subscribed to delivery channel");
        Ok(stream)
    }

    /// Drain `stream`, resubscribing whenever it ends, until `cancel` fires.
    pub async fn run(self, mut stream: BoxStream<'static, RemoteDelivery>, cancel: CancellationToken) {
        loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                next = stream.next() => match next {
                    Some(delivery) => {
                        let conn_id = delivery.connection_id;
                        let report = self.router.deliver_remote(delivery);
                        debug!(conn_id = %conn_id, delivered = report.delivered(), "Relayed remote delivery");
                    }
                    None => {
                        warn!(process_id = %self.process_id, "Delivery subscription ended, resubscribing");
                        match self.resubscribe(&cancel).await {
                            Some(next_stream) => stream = next_stream,
                            None => break,
                        }
                    }
                },
            }
        }
        debug!(process_id = %self.process_id, "Delivery subscriber stopped");
    }

    async fn resubscribe(
        &self,
        cancel: &CancellationToken,
    ) -> Option<BoxStream<'static, RemoteDelivery>> {
        let mut attempt = 1u32;
        loop {
            let delay = self.backoff.delay_for(attempt);
            tokio::select! {
                biased;
                () = cancel.cancelled() => return None,
                () = tokio::time::sleep(delay) => {}
            }

            match self.subscribe().await {
                Ok(stream) => return Some(stream),
                Err(e) => {
                    error!(attempt, error = %e, "Resubscribe failed");
                    attempt = attempt.saturating_add(1);
                }
            }
        }
    }
}
