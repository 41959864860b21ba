//! JWT claims structure used in access and refresh tokens.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use chathub_core::types::UserId;

/// JWT claims payload embedded in every token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Subject: the user ID.
    pub sub: UserId,
    /// Username for convenience.
    pub username: String,
    /// Issued-at timestamp (seconds since epoch).
    pub iat: i64,
    /// Expiration timestamp (seconds since epoch).
    pub exp: i64,
    /// Unique token ID.
    pub jti: Uuid,
    /// Token type: "access" or "refresh".
    pub token_type: TokenType,
}

/// Distinguishes access tokens from refresh tokens.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TokenType {
    /// Short-lived token presented on every request and socket connect.
    Access,
    /// Long-lived token exchanged for a new pair.
    Refresh,
}

impl Claims {
    /// Build claims expiring `ttl_seconds` from now.
    pub fn new(sub: UserId, username: &str, token_type: TokenType, ttl_seconds: i64) -> Self {
        let now = Utc::now().timestamp();
        Self {
            sub,
            username: username.to_string(),
            iat: now,
            exp: now.saturating_add(ttl_seconds),
            jti: Uuid::new_v4(),
            token_type,
        }
    }

    /// Returns the user ID from the subject claim.
    pub fn user_id(&self) -> UserId {
        self.sub
    }

    /// Returns the expiration as a `DateTime<Utc>`.
    pub fn expires_at(&self) -> DateTime<Utc> {
        DateTime::from_timestamp(self.exp, 0).unwrap_or(DateTime::<Utc>::MAX_UTC)
    }
}
