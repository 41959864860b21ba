//! Store manager that wires the configured backends together.

use std::sync::Arc;

use tracing::info;

use chathub_core::config::{ClusterConfig, PresenceConfig, StoreConfig};
use chathub_core::error::AppError;
use chathub_core::result::AppResult;

use crate::traits::{DeliveryBus, GroupDirectory, PresenceStore};

/// Handles to the presence store, group directory, and delivery bus.
///
/// The backends are selected at construction time based on configuration.
/// Every process of a deployment must point at the same backing store.
#[derive(Debug, Clone)]
pub struct StoreManager {
    presence: Arc<dyn PresenceStore>,
    groups: Arc<dyn GroupDirectory>,
    bus: Arc<dyn DeliveryBus>,
}

impl StoreManager {
    /// Create a store manager from configuration.
    pub async fn new(
        store: &StoreConfig,
        presence: &PresenceConfig,
        cluster: &ClusterConfig,
    ) -> AppResult<Self> {
        match store.provider.as_str() {
            #[cfg(feature = "redis-backend")]
            "redis" => {
                info!("Initializing Redis store backends");
                let client = crate::redis::RedisClient::connect(&store.redis).await?;
                Ok(Self {
                    presence: Arc::new(crate::redis::RedisPresenceStore::new(
                        client.clone(),
                        presence.ttl(),
                    )),
                    groups: Arc::new(crate::redis::RedisGroupDirectory::new(client.clone())),
                    bus: Arc::new(crate::redis::RedisDeliveryBus::new(
                        client,
                        cluster.channel_prefix.clone(),
                    )),
                })
            }
            #[cfg(feature = "memory")]
            "memory" => {
                info!("Initializing in-memory store backends");
                Ok(Self::in_memory(presence, cluster))
            }
            other => Err(AppError::configuration(format!(
                "Unknown store provider: '{other}'. Supported: memory, redis"
            ))),
        }
    }

    /// Build in-memory backends.
    #[cfg(feature = "memory")]
    pub fn in_memory(presence: &PresenceConfig, cluster: &ClusterConfig) -> Self {
        Self {
            presence: Arc::new(crate::memory::MemoryPresenceStore::new(presence.ttl())),
            groups: Arc::new(crate::memory::MemoryGroupDirectory::new()),
            bus: Arc::new(crate::memory::MemoryDeliveryBus::new(cluster.bus_buffer_size)),
        }
    }

    /// Create a store manager from existing backends (for testing).
    pub fn from_parts(
        presence: Arc<dyn PresenceStore>,
        groups: Arc<dyn GroupDirectory>,
        bus: Arc<dyn DeliveryBus>,
    ) -> Self {
        Self {
            presence,
            groups,
            bus,
        }
    }

    /// Presence store.
    pub fn presence(&self) -> Arc<dyn PresenceStore> {
        Arc::clone(&self.presence)
    }

    /// Group directory.
    pub fn groups(&self) -> Arc<dyn GroupDirectory> {
        Arc::clone(&self.groups)
    }

    /// Delivery bus.
    pub fn bus(&self) -> Arc<dyn DeliveryBus> {
        Arc::clone(&self.bus)
    }
}
