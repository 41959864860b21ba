//! Storage seams shared by every process in a deployment.
//!
//! Each trait has an in-memory implementation for single-process
//! deployments and tests, and a Redis implementation for clusters.

use std::collections::HashSet;
use std::fmt::Debug;

use async_trait::async_trait;
use futures::stream::BoxStream;

use chathub_core::result::AppResult;
use chathub_core::types::{ConnectionId, GroupId, ProcessId, UserId};
use chathub_entity::{Group, PresenceEntry, RemoteDelivery};

/// Shared map of user → live connection locations with TTL-based expiry.
///
/// Every entry carries a TTL. An entry whose TTL elapses without a
/// heartbeat is treated as absent by `lookup` and physically removed by
/// `evict_expired`.
#[async_trait]
pub trait PresenceStore: Send + Sync + Debug + 'static {
    /// Add or refresh the entry for `(user_id, connection_id)`.
    ///
    /// Idempotent; re-registering an existing connection resets its TTL.
    async fn register(
        &self,
        user_id: UserId,
        process_id: &ProcessId,
        connection_id: ConnectionId,
    ) -> AppResult<()>;

    /// Extend the TTL of an existing entry.
    ///
    /// Returns `false` when the entry had already expired or was never
    /// registered; the caller should then register again.
    async fn heartbeat(&self, user_id: UserId, connection_id: ConnectionId) -> AppResult<bool>;

    /// Remove the entry. Removing an absent entry is not an error.
    async fn unregister(&self, user_id: UserId, connection_id: ConnectionId) -> AppResult<()>;

    /// Live entries for a user. Empty when the user is offline.
    async fn lookup(&self, user_id: UserId) -> AppResult<Vec<PresenceEntry>>;

    /// Users with at least one live entry.
    async fn online_users(&self) -> AppResult<HashSet<UserId>>;

    /// Physically remove expired entries, returning how many were removed.
    async fn evict_expired(&self) -> AppResult<u64>;

    /// Whether the backing store is reachable.
    async fn health_check(&self) -> AppResult<bool>;
}

/// Shared map of group → member users, with the reverse index.
#[async_trait]
pub trait GroupDirectory: Send + Sync + Debug + 'static {
    /// Create a group. Fails with `Conflict` when the ID is taken.
    async fn create(&self, group_id: GroupId, name: &str, members: &[UserId]) -> AppResult<Group>;

    /// Fetch a group with its members.
    async fn get(&self, group_id: GroupId) -> AppResult<Group>;

    /// Add a member. Adding an existing member is a no-op.
    async fn add_member(&self, group_id: GroupId, user_id: UserId) -> AppResult<()>;

    /// Remove a member. Removing a non-member is a no-op.
    async fn remove_member(&self, group_id: GroupId, user_id: UserId) -> AppResult<()>;

    /// Members of a group. Fails with `NotFound` for an unknown group.
    async fn members_of(&self, group_id: GroupId) -> AppResult<HashSet<UserId>>;

    /// Groups the user belongs to.
    async fn groups_of(&self, user_id: UserId) -> AppResult<HashSet<GroupId>>;
}

/// Channel carrying envelopes to the process that owns a connection.
#[async_trait]
pub trait DeliveryBus: Send + Sync + Debug + 'static {
    /// Publish a delivery to its owning process.
    ///
    /// Delivery is at-most-once; a process that is not subscribed loses
    /// the message.
    async fn publish(&self, delivery: &RemoteDelivery) -> AppResult<()>;

    /// Subscribe to deliveries addressed to `process_id`.
    async fn subscribe(
        &self,
        process_id: &ProcessId,
    ) -> AppResult<BoxStream<'static, RemoteDelivery>>;
}
