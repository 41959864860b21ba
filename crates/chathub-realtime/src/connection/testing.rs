use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use chathub_core::types::{ConnectionId, UserId};

use super::handle::ConnectionHandle;
use super::lifecycle::{ConnectionLifecycle, ConnectionState};
use crate::message::Outbound;

/// An `Active` handle for `user_id` and the receiving end of its queue.
pub(crate) fn active_handle(
    user_id: UserId,
    buffer: usize,
) -> (Arc<ConnectionHandle>, mpsc::Receiver<Outbound>) {
    let (tx, rx) = mpsc::channel(buffer);
    let lifecycle = ConnectionLifecycle::new();
    lifecycle
        .transition(ConnectionState::Connecting, ConnectionState::Authenticated)
        .unwrap();
    lifecycle
        .transition(ConnectionState::Authenticated, ConnectionState::Active)
        .unwrap();
    let handle = ConnectionHandle::new(
        ConnectionId::new(),
        user_id,
        "test",
        tx,
        lifecycle,
        CancellationToken::new(),
    );
    (Arc::new(handle), rx)
}
