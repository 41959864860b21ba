//! Newtype wrappers for all domain identifiers.
//!
//! Using distinct types prevents accidentally passing a `GroupId` where a
//! `UserId` is expected. Process identifiers are free-form strings since
//! they usually come from the host name or deployment environment.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Macro to define a newtype ID wrapper around `Uuid`.
macro_rules! define_id {
    (
        $(#[$meta:meta])*
        $name:ident
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub Uuid);

        impl $name {
            /// Create a new random identifier.
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            /// Create an identifier from an existing UUID.
            pub fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            /// Return the inner UUID value.
            pub fn into_uuid(self) -> Uuid {
                self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = uuid::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Uuid::parse_str(s).map(Self)
            }
        }

        impl From<Uuid> for $name {
            fn from(uuid: Uuid) -> Self {
                Self(uuid)
            }
        }

        impl From<$name> for Uuid {
            fn from(id: $name) -> Uuid {
                id.0
            }
        }
    };
}

define_id!(
    /// Unique identifier for a user.
    UserId
);

define_id!(
    /// Unique identifier for a chat group.
    GroupId
);

define_id!(
    /// Unique identifier for a live connection, scoped to the owning process.
    ConnectionId
);

define_id!(
    /// Unique identifier for a message envelope.
    MessageId
);

/// Identifier of a server process participating in the deployment.
///
/// Typically `hostname:port` or a container/pod name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProcessId(String);

impl ProcessId {
    /// Create a process ID from any string.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generate a process ID from the host name plus a short random suffix.
    pub fn generate() -> Self {
        let host = std::env::var("HOSTNAME").unwrap_or_else(|_| "localhost".to_string());
        let suffix = Uuid::new_v4().simple().to_string();
        Self(format!("{host}-{}", &suffix[..8]))
    }

    /// Return the process ID as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ProcessId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for ProcessId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for ProcessId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_id_new() {
        let id1 = UserId::new();
        let id2 = UserId::new();
        assert_ne!(id1, id2);
    }

    #[test]
    fn test_user_id_from_str() {
        let uuid = Uuid::new_v4();
        let id: UserId = uuid.to_string().parse().expect("should parse");
        assert_eq!(id.0, uuid);
    }

    #[test]
    fn test_connection_id_serializes_as_plain_uuid() {
        let id = ConnectionId::new();
        let json = serde_json::to_string(&id).expect("serialize");
        assert_eq!(json, format!("\"{}\"", id.0));
    }

    #[test]
    fn test_generated_process_ids_differ() {
        assert_ne!(ProcessId::generate(), ProcessId::generate());
        assert_eq!(ProcessId::from("node-a").as_str(), "node-a");
    }
}
