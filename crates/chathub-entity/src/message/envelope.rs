//! Message envelope and target model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use chathub_core::types::{ConnectionId, GroupId, MessageId, ProcessId, UserId};

/// Addressee of a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum Target {
    /// A single user, delivered to every one of their connections.
    User(UserId),
    /// Every member of a group except the sender.
    Group(GroupId),
}

impl Target {
    /// Group ID when the target is a group.
    pub fn group_id(&self) -> Option<GroupId> {
        match self {
            Self::Group(id) => Some(*id),
            Self::User(_) => None,
        }
    }
}

/// A routed chat message.
///
/// The payload is opaque to the server; only the routing metadata is
/// interpreted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageEnvelope {
    /// Unique message ID.
    pub id: MessageId,
    /// Authenticated sender.
    pub sender: UserId,
    /// Connection the message arrived on.
    pub sender_connection: ConnectionId,
    /// Addressee.
    pub target: Target,
    /// Client payload, forwarded untouched.
    pub payload: Value,
    /// Per-connection sequence number assigned on receipt.
    pub seq: u64,
    /// Server receive time.
    pub sent_at: DateTime<Utc>,
}

impl MessageEnvelope {
    /// Build an envelope stamped with a fresh ID and the current time.
    pub fn new(
        sender: UserId,
        sender_connection: ConnectionId,
        target: Target,
        payload: Value,
        seq: u64,
    ) -> Self {
        Self {
            id: MessageId::new(),
            sender,
            sender_connection,
            target,
            payload,
            seq,
            sent_at: Utc::now(),
        }
    }

    /// Render the frame sent to a recipient.
    ///
    /// Object payloads are flattened into the frame; routing metadata wins
    /// on key collisions. Any other payload is carried under `payload`.
    pub fn to_frame(&self) -> Value {
        let mut frame = match &self.payload {
            Value::Object(map) => map.clone(),
            Value::Null => Map::new(),
            other => {
                let mut map = Map::new();
                map.insert("payload".to_string(), other.clone());
                map
            }
        };

        frame.insert("type".to_string(), Value::from("message"));
        frame.insert("message_id".to_string(), Value::from(self.id.to_string()));
        frame.insert("from".to_string(), Value::from(self.sender.to_string()));
        frame.insert("seq".to_string(), Value::from(self.seq));
        frame.insert("sent_at".to_string(), Value::from(self.sent_at.to_rfc3339()));
        if let Some(group_id) = self.target.group_id() {
            frame.insert("group".to_string(), Value::from(group_id.to_string()));
        }

        Value::Object(frame)
    }
}

/// An envelope addressed to one connection owned by another process.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteDelivery {
    /// Process that owns the connection.
    pub process_id: ProcessId,
    /// Destination connection.
    pub connection_id: ConnectionId,
    /// Message to deliver.
    pub envelope: MessageEnvelope,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_frame_flattens_object_payload() {
        let sender = UserId::new();
        let envelope = MessageEnvelope::new(
            sender,
            ConnectionId::new(),
            Target::User(UserId::new()),
            json!({"text": "hi", "from": "spoofed"}),
            7,
        );

        let frame = envelope.to_frame();
        assert_eq!(frame["type"], "message");
        assert_eq!(frame["text"], "hi");
        assert_eq!(frame["from"], sender.to_string());
        assert_eq!(frame["seq"], 7);
        assert!(frame.get("group").is_none());
    }

    #[test]
    fn test_frame_wraps_scalar_payload() {
        let group = GroupId::new();
        let envelope = MessageEnvelope::new(
            UserId::new(),
            ConnectionId::new(),
            Target::Group(group),
            json!("plain text"),
            1,
        );

        let frame = envelope.to_frame();
        assert_eq!(frame["payload"], "plain text");
        assert_eq!(frame["group"], group.to_string());
    }

    #[test]
    fn test_target_wire_shape() {
        let id = UserId::new();
        let value = serde_json::to_value(Target::User(id)).unwrap();
        assert_eq!(value, json!({"kind": "user", "id": id.to_string()}));
    }
}
