//! Application configuration schemas.
//!
//! All configuration structs are deserialized from TOML files via the
//! `config` crate. Each sub-module represents a logical configuration
//! section, and every field carries a serde default so an empty file is a
//! valid single-process development setup.

pub mod app;
pub mod auth;
pub mod cluster;
pub mod logging;
pub mod presence;
pub mod realtime;
pub mod store;
pub mod users;

use serde::{Deserialize, Serialize};

pub use self::app::{CorsConfig, ServerConfig};
pub use self::auth::AuthConfig;
pub use self::cluster::ClusterConfig;
pub use self::logging::LoggingConfig;
pub use self::presence::PresenceConfig;
pub use self::realtime::RealtimeConfig;
pub use self::store::{RedisStoreConfig, StoreConfig};
pub use self::users::SeedUser;

use crate::error::AppError;

/// Upper bound on every configured TTL: ten years.
pub const MAX_TTL_SECONDS: u64 = 10 * 365 * 24 * 60 * 60;

/// Root application configuration.
///
/// Top-level deserialization target for the merged TOML configuration
/// (default.toml + environment overlay + `CHATHUB__*` variables).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// HTTP server settings.
    #[serde(default)]
    pub server: ServerConfig,
    /// Token and cookie settings.
    #[serde(default)]
    pub auth: AuthConfig,
    /// Shared-state backend settings.
    #[serde(default)]
    pub store: StoreConfig,
    /// Presence TTL and heartbeat settings.
    #[serde(default)]
    pub presence: PresenceConfig,
    /// Real-time WebSocket settings.
    #[serde(default)]
    pub realtime: RealtimeConfig,
    /// Multi-process deployment settings.
    #[serde(default)]
    pub cluster: ClusterConfig,
    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Users loaded into the in-memory user directory at startup.
    #[serde(default)]
    pub users: Vec<SeedUser>,
}

impl AppConfig {
    /// Load configuration from TOML files.
    ///
    /// Merges `config/default.toml` with `config/{env}.toml` and environment
    /// variables prefixed with `CHATHUB__` (e.g. `CHATHUB__STORE__PROVIDER`).
    pub fn load(env: &str) -> Result<Self, AppError> {
        let config = config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::File::with_name(&format!("config/{env}")).required(false))
            .add_source(
                config::Environment::with_prefix("CHATHUB")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| AppError::configuration(format!("Failed to build config: {e}")))?;

        let loaded: Self = config
            .try_deserialize()
            .map_err(|e| AppError::configuration(format!("Failed to deserialize config: {e}")))?;

        loaded.validate()?;
        Ok(loaded)
    }

    /// Cross-field sanity checks that serde defaults cannot express.
    pub fn validate(&self) -> Result<(), AppError> {
        if self.presence.ttl_seconds <= self.presence.heartbeat_interval_seconds {
            return Err(AppError::configuration(format!(
                "presence.ttl_seconds ({}) must exceed presence.heartbeat_interval_seconds ({})",
                self.presence.ttl_seconds, self.presence.heartbeat_interval_seconds
            )));
        }
        for (name, value) in [
            ("auth.access_ttl_seconds", self.auth.access_ttl_seconds),
            ("auth.refresh_ttl_seconds", self.auth.refresh_ttl_seconds),
            ("presence.ttl_seconds", self.presence.ttl_seconds),
        ] {
            if value > MAX_TTL_SECONDS {
                return Err(AppError::configuration(format!(
                    "{name} ({value}) must not exceed {MAX_TTL_SECONDS}"
                )));
            }
        }
        if self.auth.jwt_secret.len() < 16 {
            return Err(AppError::configuration(
                "auth.jwt_secret must be at least 16 bytes",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = AppConfig::default();
        config.validate().expect("defaults should validate");
        assert_eq!(config.store.provider, "memory");
        assert!(config.presence.ttl_seconds > config.presence.heartbeat_interval_seconds);
    }

    #[test]
    fn test_ttl_must_exceed_heartbeat() {
        let mut config = AppConfig::default();
        config.presence.ttl_seconds = config.presence.heartbeat_interval_seconds;
        let err = config.validate().unwrap_err();
        assert_eq!(err.kind, crate::error::ErrorKind::Configuration);
    }

    #[test]
    fn test_ttls_are_bounded() {
        let mut config = AppConfig::default();
        config.auth.refresh_ttl_seconds = u64::MAX;
        let err = config.validate().unwrap_err();
        assert_eq!(err.kind, crate::error::ErrorKind::Configuration);
        assert!(err.message.contains("auth.refresh_ttl_seconds"));

        let mut config = AppConfig::default();
        config.presence.ttl_seconds = MAX_TTL_SECONDS + 1;
        assert!(config.validate().is_err());

        config.presence.ttl_seconds = MAX_TTL_SECONDS;
        config.validate().expect("bound itself is allowed");
    }
}
