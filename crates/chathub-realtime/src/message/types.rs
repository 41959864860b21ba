//! Inbound and outbound WebSocket message type definitions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use chathub_core::types::{GroupId, UserId};
use chathub_entity::{Target, UserProfile};

/// Frames sent by the client to the server.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientFrame {
    /// Message to every connection of one user.
    Direct {
        /// Recipient user ID.
        to: UserId,
        /// Opaque payload.
        #[serde(default)]
        payload: Value,
    },
    /// Message to every member of a group except the sender.
    Group {
        /// Recipient group ID.
        to: GroupId,
        /// Opaque payload.
        #[serde(default)]
        payload: Value,
    },
    /// Application-level keepalive.
    Ping,
}

impl ClientFrame {
    /// Routing target and payload, if this frame carries a message.
    pub fn into_message(self) -> Option<(Target, Value)> {
        match self {
            Self::Direct { to, payload } => Some((Target::User(to), payload)),
            Self::Group { to, payload } => Some((Target::Group(to), payload)),
            Self::Ping => None,
        }
    }
}

/// Control frames sent by the server to a client.
///
/// Routed messages are rendered by `MessageEnvelope::to_frame` instead.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerFrame {
    /// Delivery confirmation for the sender.
    Ack {
        /// Sequence number assigned to the message.
        seq: u64,
        /// Connections the message was handed to.
        delivered: usize,
    },
    /// Failure report for the sender.
    Error {
        /// Machine-readable error code.
        code: String,
        /// Sequence number of the failed message, when one was assigned.
        #[serde(skip_serializing_if = "Option::is_none")]
        seq: Option<u64>,
        /// Human-readable description.
        message: String,
    },
    /// Reply to a client ping.
    Pong {
        /// Server time.
        timestamp: DateTime<Utc>,
    },
}

/// First frame after connect: the authenticated user's profile.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelfSnapshot {
    /// The connected user.
    pub user: UserProfile,
}

/// Second frame after connect: the other active users.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsersSnapshot {
    /// Active users other than the connected one.
    pub users: Vec<KnownUser>,
}

/// A user profile with its presence flag.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnownUser {
    /// Public profile.
    #[serde(flatten)]
    pub profile: UserProfile,
    /// Whether the user has at least one live connection.
    pub online: bool,
}

/// Items queued for a connection's writer task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    /// A serialized JSON text frame.
    Frame(String),
    /// A transport-level ping.
    Ping,
    /// Close the socket with a code and reason.
    Close {
        /// WebSocket close code.
        code: u16,
        /// Close reason.
        reason: String,
    },
}
