//! Connection registry: every live connection owned by this process.

use std::sync::Arc;

use dashmap::DashMap;

use chathub_core::error::AppError;
use chathub_core::result::AppResult;
use chathub_core::types::{ConnectionId, UserId};

use super::handle::ConnectionHandle;

/// Thread-safe table of this process's WebSocket connections.
///
/// Indexed both by connection ID and by user. A user's handles are kept in
/// registration order, oldest first.
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    by_user: DashMap<UserId, Vec<Arc<ConnectionHandle>>>,
    by_id: DashMap<ConnectionId, Arc<ConnectionHandle>>,
}

impl ConnectionRegistry {
    /// Creates a new empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a connection.
    pub fn add(&self, handle: Arc<ConnectionHandle>) {
        self.by_id.insert(handle.id, Arc::clone(&handle));
        self.by_user.entry(handle.user_id).or_default().push(handle);
    }

    /// Removes a connection, returning its handle if it was present.
    pub fn remove(&self, conn_id: &ConnectionId) -> Option<Arc<ConnectionHandle>> {
        let (_, handle) = self.by_id.remove(conn_id)?;
        self.by_user.remove_if_mut(&handle.user_id, |_, connections| {
            connections.retain(|c| c.id != *conn_id);
            connections.is_empty()
        });
        Some(handle)
    }

    /// Gets a connection by ID.
    pub fn get(&self, conn_id: &ConnectionId) -> AppResult<Arc<ConnectionHandle>> {
        self.by_id
            .get(conn_id)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| AppError::not_found(format!("Connection {conn_id} is not registered")))
    }

    /// IDs of the user's local connections, oldest first.
    pub fn connections_of_user(&self, user_id: &UserId) -> Vec<ConnectionId> {
        self.by_user
            .get(user_id)
            .map(|entry| entry.iter().map(|c| c.id).collect())
            .unwrap_or_default()
    }

    /// Handles of the user's local connections, oldest first.
    pub fn handles_of_user(&self, user_id: &UserId) -> Vec<Arc<ConnectionHandle>> {
        self.by_user
            .get(user_id)
            .map(|entry| entry.value().clone())
            .unwrap_or_default()
    }

    /// Whether the user has at least one local connection.
    pub fn is_connected(&self, user_id: &UserId) -> bool {
        self.by_user.contains_key(user_id)
    }

    /// Returns total number of registered connections.
    pub fn connection_count(&self) -> usize {
        self.by_id.len()
    }

    /// Returns number of unique connected users.
    pub fn user_count(&self) -> usize {
        self.by_user.len()
    }

    /// Returns all connection handles.
    pub fn all(&self) -> Vec<Arc<ConnectionHandle>> {
        self.by_id
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect()
    }

    /// Returns all locally connected user IDs.
    pub fn connected_user_ids(&self) -> Vec<UserId> {
        self.by_user.iter().map(|entry| *entry.key()).collect()
    }
}
