//! Group entity model.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use chathub_core::types::{GroupId, UserId};

/// A named set of users that can be addressed as one message target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Group {
    /// Group identifier.
    pub id: GroupId,
    /// Display name.
    pub name: String,
    /// Member user IDs.
    pub members: BTreeSet<UserId>,
    /// When the group was created.
    pub created_at: DateTime<Utc>,
}

impl Group {
    /// Build a new group.
    pub fn new(id: GroupId, name: impl Into<String>, members: impl IntoIterator<Item = UserId>) -> Self {
        Self {
            id,
            name: name.into(),
            members: members.into_iter().collect(),
            created_at: Utc::now(),
        }
    }

    /// Whether the user is a member.
    pub fn contains(&self, user_id: &UserId) -> bool {
        self.members.contains(user_id)
    }
}
