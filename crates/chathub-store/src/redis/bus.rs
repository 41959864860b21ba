//! Redis pub/sub delivery bus.
//!
//! Each process subscribes to its own channel; publishers address the
//! owning process directly.

use async_trait::async_trait;
use futures::stream::{BoxStream, StreamExt};
use tracing::{info, warn};

use chathub_core::error::{AppError, ErrorKind};
use chathub_core::result::AppResult;
use chathub_core::types::ProcessId;
use chathub_entity::RemoteDelivery;

use super::client::{RedisClient, map_err};
use crate::keys;
use crate::traits::DeliveryBus;

/// Delivery bus over Redis pub/sub.
#[derive(Debug, Clone)]
pub struct RedisDeliveryBus {
    client: RedisClient,
    channel_prefix: String,
}

impl RedisDeliveryBus {
    /// Create a bus publishing on `{channel_prefix}{process_id}`.
    pub fn new(client: RedisClient, channel_prefix: impl Into<String>) -> Self {
        Self {
            client,
            channel_prefix: channel_prefix.into(),
        }
    }

    fn channel(&self, process_id: &ProcessId) -> String {
        self.client.prefixed_key(&keys::delivery_channel(
            &self.channel_prefix,
            process_id.as_str(),
        ))
    }
}

#[async_trait]
impl DeliveryBus for RedisDeliveryBus {
    async fn publish(&self, delivery: &RemoteDelivery) -> AppResult<()> {
        let payload = serde_json::to_string(delivery)?;
        let channel = self.channel(&delivery.process_id);

        let mut conn = self.client.conn_mut();
        let receivers: i64 = redis::cmd("PUBLISH")
            .arg(&channel)
            .arg(payload)
            .query_async(&mut conn)
            .await
            .map_err(map_err)?;

        if receivers == 0 {
            warn!(%channel, "Delivery published with no subscriber");
        }
        Ok(())
    }

    async fn subscribe(
        &self,
        process_id: &ProcessId,
    ) -> AppResult<BoxStream<'static, RemoteDelivery>> {
        let channel = self.channel(process_id);
        let mut pubsub = self.client.client().get_async_pubsub().await.map_err(|e| {
            AppError::with_source(
                ErrorKind::StoreUnavailable,
                "Failed to open Redis pub/sub connection",
                e,
            )
        })?;
        pubsub.subscribe(&channel).await.map_err(map_err)?;
        info!(%channel, "Subscribed to delivery channel");

        let stream = pubsub.into_on_message().filter_map(|msg| async move {
            let payload: String = match msg.get_payload() {
                Ok(p) => p,
                Err(e) => {
                    warn!(error = %e, "Unreadable delivery payload");
                    return None;
                }
            };
            match serde_json::from_str::<RemoteDelivery>(&payload) {
                Ok(delivery) => Some(delivery),
                Err(e) => {
                    warn!(error = %e, "Malformed delivery on bus");
                    None
                }
            }
        });

        Ok(stream.boxed())
    }
}
