//! Shared-state store configuration.

use serde::{Deserialize, Serialize};

/// Backend for the presence store, group directory, and cross-process bus.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Store provider type: `"memory"` (single process) or `"redis"`.
    #[serde(default = "default_provider")]
    pub provider: String,
    /// Redis-specific configuration.
    #[serde(default)]
    pub redis: RedisStoreConfig,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            redis: RedisStoreConfig::default(),
        }
    }
}

/// Redis backend configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedisStoreConfig {
    /// Redis connection URL.
    #[serde(default = "default_redis_url")]
    pub url: String,
    /// Key prefix for all ChatHub keys.
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,
}

impl Default for RedisStoreConfig {
    fn default() -> Self {
        Self {
            url: default_redis_url(),
            key_prefix: default_key_prefix(),
        }
    }
}

fn default_provider() -> String {
    "memory".to_string()
}

fn default_redis_url() -> String {
    "redis://localhost:6379".to_string()
}

fn default_key_prefix() -> String {
    "chathub:".to_string()
}
