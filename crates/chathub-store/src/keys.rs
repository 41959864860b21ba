//! Redis key builders for presence and group records.
//!
//! Every key here is relative; the Redis client applies the configured
//! deployment prefix.

use chathub_core::types::{GroupId, UserId};

// ── Presence keys ──────────────────────────────────────────

/// Sorted set of a user's connection IDs scored by expiry (epoch ms).
pub fn presence_connections(user_id: UserId) -> String {
    format!("presence:user:{user_id}")
}

/// Hash of a user's connection ID → serialized location.
pub fn presence_locations(user_id: UserId) -> String {
    format!("presence:loc:{user_id}")
}

/// Sorted set of user IDs scored by their latest connection expiry.
pub fn presence_index() -> String {
    "presence:index".to_string()
}

// ── Group keys ─────────────────────────────────────────────

/// Hash holding group metadata.
pub fn group_meta(group_id: GroupId) -> String {
    format!("group:{group_id}")
}

/// Set of group member IDs.
pub fn group_members(group_id: GroupId) -> String {
    format!("group:{group_id}:members")
}

/// Set of group IDs a user belongs to.
pub fn user_groups(user_id: UserId) -> String {
    format!("user:{user_id}:groups")
}

// ── Bus channels ───────────────────────────────────────────

/// Pub/sub channel for deliveries owned by a process.
pub fn delivery_channel(channel_prefix: &str, process_id: &str) -> String {
    format!("{channel_prefix}{process_id}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keys_are_distinct_per_record_type() {
        let user = UserId::new();
        let group = GroupId::new();
        let keys = [
            presence_connections(user),
            presence_locations(user),
            presence_index(),
            group_meta(group),
            group_members(group),
            user_groups(user),
        ];
        let unique: std::collections::HashSet<_> = keys.iter().collect();
        assert_eq!(unique.len(), keys.len());
    }

    #[test]
    fn test_delivery_channel() {
        assert_eq!(delivery_channel("chathub:deliver:", "node-a"), "chathub:deliver:node-a");
    }
}
