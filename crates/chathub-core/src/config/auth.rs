//! Authentication configuration.

use serde::{Deserialize, Serialize};

/// Token signing and cookie configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Secret key for JWT signing (HMAC-SHA256).
    #[serde(default = "default_jwt_secret")]
    pub jwt_secret: String,
    /// Access token TTL in seconds.
    #[serde(default = "default_access_ttl")]
    pub access_ttl_seconds: u64,
    /// Refresh token TTL in seconds.
    #[serde(default = "default_refresh_ttl")]
    pub refresh_ttl_seconds: u64,
    /// Clock-skew leeway applied when checking `exp`, in seconds.
    #[serde(default)]
    pub leeway_seconds: u64,
    /// `Max-Age` of the token cookies set on login, in seconds.
    #[serde(default = "default_cookie_max_age")]
    pub cookie_max_age_seconds: u64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: default_jwt_secret(),
            access_ttl_seconds: default_access_ttl(),
            refresh_ttl_seconds: default_refresh_ttl(),
            leeway_seconds: 0,
            cookie_max_age_seconds: default_cookie_max_age(),
        }
    }
}

fn default_jwt_secret() -> String {
    "CHANGE_ME_IN_PRODUCTION".to_string()
}

fn default_access_ttl() -> u64 {
    30 * 60
}

fn default_refresh_ttl() -> u64 {
    24 * 60 * 60
}

fn default_cookie_max_age() -> u64 {
    1800
}
