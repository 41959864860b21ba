//! JWT token creation with configurable TTL.

use chrono::{DateTime, Utc};
use jsonwebtoken::{EncodingKey, Header, encode};
use serde::{Deserialize, Serialize};

use chathub_core::config::AuthConfig;
use chathub_core::error::AppError;
use chathub_core::types::UserId;

use super::claims::{Claims, TokenType};

/// Creates signed HS256 access and refresh tokens.
#[derive(Clone)]
pub struct JwtEncoder {
    /// HMAC secret key for signing.
    encoding_key: EncodingKey,
    /// Access token TTL in seconds.
    access_ttl_seconds: i64,
    /// Refresh token TTL in seconds.
    refresh_ttl_seconds: i64,
}

impl std::fmt::Debug for JwtEncoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwtEncoder")
            .field("access_ttl_seconds", &self.access_ttl_seconds)
            .field("refresh_ttl_seconds", &self.refresh_ttl_seconds)
            .finish()
    }
}

/// Result of a successful token pair generation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenPair {
    /// Short-lived access token.
    pub access_token: String,
    /// Long-lived refresh token.
    pub refresh_token: String,
    /// Access token expiration timestamp.
    pub access_expires_at: DateTime<Utc>,
    /// Refresh token expiration timestamp.
    pub refresh_expires_at: DateTime<Utc>,
}

impl JwtEncoder {
    /// Creates a new encoder from auth configuration.
    pub fn new(config: &AuthConfig) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(config.jwt_secret.as_bytes()),
            access_ttl_seconds: i64::try_from(config.access_ttl_seconds).unwrap_or(i64::MAX),
            refresh_ttl_seconds: i64::try_from(config.refresh_ttl_seconds).unwrap_or(i64::MAX),
        }
    }

    /// Generates a new access + refresh token pair for the given user.
    pub fn generate_token_pair(
        &self,
        user_id: UserId,
        username: &str,
    ) -> Result<TokenPair, AppError> {
        let access = Claims::new(user_id, username, TokenType::Access, self.access_ttl_seconds);
        let refresh = Claims::new(
            user_id,
            username,
            TokenType::Refresh,
            self.refresh_ttl_seconds,
        );

        Ok(TokenPair {
            access_token: self.encode_claims(&access)?,
            refresh_token: self.encode_claims(&refresh)?,
            access_expires_at: access.expires_at(),
            refresh_expires_at: refresh.expires_at(),
        })
    }

    /// Signs arbitrary claims.
    pub fn encode_claims(&self, claims: &Claims) -> Result<String, AppError> {
        encode(&Header::default(), claims, &self.encoding_key)
            .map_err(|e| AppError::internal(format!("Failed to encode token: {e}")))
    }
}
