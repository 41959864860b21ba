//! Presence entry model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use chathub_core::types::{ConnectionId, ProcessId};

/// Location of one live connection of a user.
///
/// A user's presence record is the set of these entries, one per connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresenceEntry {
    /// Process that owns the connection.
    pub process_id: ProcessId,
    /// Connection identifier within that process.
    pub connection_id: ConnectionId,
    /// When the connection was registered.
    pub connected_at: DateTime<Utc>,
}

impl PresenceEntry {
    /// Build an entry stamped with the current time.
    pub fn new(process_id: ProcessId, connection_id: ConnectionId) -> Self {
        Self {
            process_id,
            connection_id,
            connected_at: Utc::now(),
        }
    }

    /// Whether the connection lives in the given process.
    pub fn is_local_to(&self, process_id: &ProcessId) -> bool {
        &self.process_id == process_id
    }
}
