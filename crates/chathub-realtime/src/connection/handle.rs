//! Individual WebSocket connection handle.

use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{RwLock, mpsc};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use chathub_core::error::AppError;
use chathub_core::result::AppResult;
use chathub_core::types::{ConnectionId, UserId};

use super::lifecycle::{ConnectionLifecycle, ConnectionState};
use crate::message::Outbound;

/// A handle to a single WebSocket connection.
///
/// Holds the sender channel for pushing frames to the client's writer
/// task, the lifecycle state, and metadata about the connected user.
#[derive(Debug)]
pub struct ConnectionHandle {
    /// Unique connection ID
    pub id: ConnectionId,
    /// User who owns this connection
    pub user_id: UserId,
    /// Username (cached for logging)
    pub username: String,
    /// When the connection was established
    pub connected_at: DateTime<Utc>,
    sender: mpsc::Sender<Outbound>,
    lifecycle: ConnectionLifecycle,
    next_seq: AtomicU64,
    last_activity: RwLock<Instant>,
    cancel: CancellationToken,
}

impl ConnectionHandle {
    /// Create a handle for an authenticated connection.
    pub fn new(
        id: ConnectionId,
        user_id: UserId,
        username: impl Into<String>,
        sender: mpsc::Sender<Outbound>,
        lifecycle: ConnectionLifecycle,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            id,
            user_id,
            username: username.into(),
            connected_at: Utc::now(),
            sender,
            lifecycle,
            next_seq: AtomicU64::new(1),
            last_activity: RwLock::new(Instant::now()),
            cancel,
        }
    }

    /// Queue a frame for the client.
    ///
    /// Fails with `ConnectionRace` when the connection is no longer active
    /// or its writer has gone away.
    pub fn send(&self, msg: Outbound) -> AppResult<()> {
        if !self.lifecycle.is_active() {
            return Err(AppError::connection_race(format!(
                "Connection {} is {}",
                self.id,
                self.lifecycle.state()
            )));
        }
        self.push(msg)
    }

    /// Queue a frame regardless of lifecycle state.
    ///
    /// Used for the initial snapshots and the final close frame.
    pub(crate) fn push(&self, msg: Outbound) -> AppResult<()> {
        match self.sender.try_send(msg) {
            Ok(()) => Ok(()),
            Err(mpsc::error::TrySendError::Full(_)) => {
                tracing::warn!(conn_id = %self.id, "Send buffer full, dropping frame");
                Err(AppError::internal(format!(
                    "Send buffer of connection {} is full",
                    self.id
                )))
            }
            Err(mpsc::error::TrySendError::Closed(_)) => Err(AppError::connection_race(format!(
                "Connection {} writer has closed",
                self.id
            ))),
        }
    }

    /// Lifecycle state machine of this connection.
    pub fn lifecycle(&self) -> &ConnectionLifecycle {
        &self.lifecycle
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ConnectionState {
        self.lifecycle.state()
    }

    /// Next per-connection sequence number, starting at 1.
    pub fn next_seq(&self) -> u64 {
        self.next_seq.fetch_add(1, Ordering::Relaxed)
    }

    /// Update last activity timestamp
    pub async fn touch(&self) {
        let mut la = self.last_activity.write().await;
        *la = Instant::now();
    }

    /// Time since the client was last heard from.
    pub async fn idle_for(&self) -> std::time::Duration {
        self.last_activity.read().await.elapsed()
    }

    /// Token cancelled when the connection starts closing.
    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Snapshot of connection info.
    pub fn info(&self) -> ConnectionInfo {
        ConnectionInfo {
            id: self.id,
            user_id: self.user_id,
            username: self.username.clone(),
            connected_at: self.connected_at,
            state: self.state(),
        }
    }
}

/// Snapshot of connection info (serializable)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionInfo {
    /// Connection ID
    pub id: ConnectionId,
    /// User ID
    pub user_id: UserId,
    /// Username
    pub username: String,
    /// Connected at
    pub connected_at: DateTime<Utc>,
    /// Lifecycle state
    pub state: ConnectionState,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::testing::active_handle;
    use chathub_core::error::ErrorKind;

    #[tokio::test]
    async fn test_send_reaches_writer() {
        let (handle, mut rx) = active_handle(UserId::new(), 4);
        handle.send(Outbound::Frame("{}".to_string())).unwrap();
        assert_eq!(rx.recv().await, Some(Outbound::Frame("{}".to_string())));
    }

    #[test]
    fn test_send_after_closing_is_race() {
        let (handle, _rx) = active_handle(UserId::new(), 4);
        assert!(handle.lifecycle().begin_closing());
        let err = handle.send(Outbound::Ping).unwrap_err();
        assert_eq!(err.kind, ErrorKind::ConnectionRace);
    }

    #[test]
    fn test_send_to_dropped_writer_is_race() {
        let (handle, rx) = active_handle(UserId::new(), 4);
        drop(rx);
        let err = handle.send(Outbound::Ping).unwrap_err();
        assert_eq!(err.kind, ErrorKind::ConnectionRace);
    }

    #[test]
    fn test_full_buffer_is_reported() {
        let (handle, _rx) = active_handle(UserId::new(), 1);
        handle.send(Outbound::Ping).unwrap();
        let err = handle.send(Outbound::Ping).unwrap_err();
        assert_eq!(err.kind, ErrorKind::Internal);
    }

    #[test]
    fn test_sequence_is_monotonic() {
        let (handle, _rx) = active_handle(UserId::new(), 1);
        assert_eq!(handle.next_seq(), 1);
        assert_eq!(handle.next_seq(), 2);
        assert_eq!(handle.next_seq(), 3);
    }
}
