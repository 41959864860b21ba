//! Response DTOs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use chathub_auth::TokenPair;
use chathub_core::types::{GroupId, UserId};
use chathub_entity::Group;
use chathub_realtime::MetricsSnapshot;

/// Standard success response wrapper.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResponse<T: Serialize> {
    /// Whether the request was successful.
    pub success: bool,
    /// Response data.
    pub data: T,
}

impl<T: Serialize> ApiResponse<T> {
    /// Creates a successful response.
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data,
        }
    }
}

/// OAuth2-style token response returned by login and refresh.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenResponse {
    /// Access token.
    pub access_token: String,
    /// Refresh token.
    pub refresh_token: String,
    /// Always `bearer`.
    pub token_type: String,
    /// Access token expiration.
    pub access_expires_at: DateTime<Utc>,
    /// Refresh token expiration.
    pub refresh_expires_at: DateTime<Utc>,
}

impl From<TokenPair> for TokenResponse {
    fn from(pair: TokenPair) -> Self {
        Self {
            access_token: pair.access_token,
            refresh_token: pair.refresh_token,
            token_type: "bearer".to_string(),
            access_expires_at: pair.access_expires_at,
            refresh_expires_at: pair.refresh_expires_at,
        }
    }
}

/// Group with its member list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupResponse {
    /// Group ID.
    pub id: GroupId,
    /// Display name.
    pub name: String,
    /// Members, sorted.
    pub members: Vec<UserId>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
}

impl From<Group> for GroupResponse {
    fn from(group: Group) -> Self {
        Self {
            id: group.id,
            name: group.name,
            members: group.members.into_iter().collect(),
            created_at: group.created_at,
        }
    }
}

/// Health check response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    /// `ok` or `degraded`.
    pub status: String,
    /// Server version.
    pub version: String,
    /// This process's ID.
    pub process_id: String,
    /// Whether the shared store answered.
    pub store_healthy: bool,
    /// Connections in this process.
    pub connections: usize,
    /// Distinct users connected to this process.
    pub users: usize,
    /// Engine counters.
    pub metrics: MetricsSnapshot,
}
