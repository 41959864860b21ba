//! Connection manager: accept, authenticate, activate, route inbound
//! frames, and close connections.
//!
//! Every connection walks `Connecting → Authenticated → Active → Closing →
//! Closed`. Closing is idempotent; whichever of the socket loop, the
//! heartbeat, an eviction, or shutdown gets there first performs the
//! cleanup.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use chathub_auth::Authenticator;
use chathub_core::config::{PresenceConfig, RealtimeConfig};
use chathub_core::error::AppError;
use chathub_core::result::AppResult;
use chathub_core::types::{ConnectionId, ProcessId, UserId};
use chathub_entity::{MessageEnvelope, User};
use chathub_store::PresenceStore;

use crate::message::{ClientFrame, KnownUser, Outbound, SelfSnapshot, ServerFrame, UsersSnapshot};
use crate::metrics::{EngineMetrics, connections, messages};
use crate::presence::{RetryPolicy, spawn_retry};
use crate::router::FanoutRouter;

use super::handle::ConnectionHandle;
use super::heartbeat;
use super::lifecycle::{ConnectionLifecycle, ConnectionState};
use super::registry::ConnectionRegistry;

/// Why a connection is being closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    /// The client closed the socket.
    ClientClosed,
    /// Reading from or writing to the socket failed.
    TransportError,
    /// No traffic within the ping timeout.
    Timeout,
    /// Displaced by a newer connection of the same user.
    Evicted,
    /// The server is shutting down.
    Shutdown,
}

impl CloseReason {
    /// Close frame to send to the client, if the server initiated the close.
    pub fn close_frame(self) -> Option<(u16, &'static str)> {
        match self {
            Self::ClientClosed | Self::TransportError => None,
            Self::Timeout => Some((1001, "ping timeout")),
            Self::Evicted => Some((1008, "connection limit reached")),
            Self::Shutdown => Some((1001, "server shutting down")),
        }
    }
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::ClientClosed => "client_closed",
            Self::TransportError => "transport_error",
            Self::Timeout => "timeout",
            Self::Evicted => "evicted",
            Self::Shutdown => "shutdown",
        };
        f.write_str(s)
    }
}

/// Manages the lifecycle of every WebSocket connection in this process.
#[derive(Debug)]
pub struct ConnectionManager {
    process_id: ProcessId,
    registry: Arc<ConnectionRegistry>,
    presence: Arc<dyn PresenceStore>,
    authenticator: Arc<Authenticator>,
    router: Arc<FanoutRouter>,
    metrics: Arc<EngineMetrics>,
    config: RealtimeConfig,
    presence_config: PresenceConfig,
    retry: RetryPolicy,
    shutdown: CancellationToken,
}

impl ConnectionManager {
    /// Creates a new connection manager.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        process_id: ProcessId,
        registry: Arc<ConnectionRegistry>,
        presence: Arc<dyn PresenceStore>,
        authenticator: Arc<Authenticator>,
        router: Arc<FanoutRouter>,
        metrics: Arc<EngineMetrics>,
        config: RealtimeConfig,
        presence_config: PresenceConfig,
        shutdown: CancellationToken,
    ) -> Self {
        let retry = RetryPolicy::from_config(&presence_config);
        Self {
            process_id,
            registry,
            presence,
            authenticator,
            router,
            metrics,
            config,
            presence_config,
            retry,
            shutdown,
        }
    }

    /// Authenticate and activate a new connection in one step.
    ///
    /// Returns the handle and the receiver the socket writer drains.
    pub async fn connect(
        self: &Arc<Self>,
        access_token: Option<&str>,
    ) -> AppResult<(Arc<ConnectionHandle>, mpsc::Receiver<Outbound>)> {
        let lifecycle = ConnectionLifecycle::new();
        let user = self.authenticate(&lifecycle, access_token).await?;
        self.activate(lifecycle, &user).await
    }

    /// Validate the connection's token and bind it to an active user.
    ///
    /// On failure the lifecycle is moved straight to `Closed`.
    pub async fn authenticate(
        &self,
        lifecycle: &ConnectionLifecycle,
        access_token: Option<&str>,
    ) -> AppResult<User> {
        let result = match access_token.map(str::trim).filter(|t| !t.is_empty()) {
            Some(token) => self.authenticator.authenticate(token).await,
            None => Err(AppError::token_invalid("Missing access token")),
        };

        match result {
            Ok(user) => {
                lifecycle.transition(ConnectionState::Connecting, ConnectionState::Authenticated)?;
                Ok(user)
            }
            Err(e) => {
                connections::record_auth_failure(&self.metrics);
                if lifecycle.begin_closing() {
                    let _ = lifecycle.finish_closing();
                }
                warn!(error = %e, "WebSocket authentication failed");
                Err(e)
            }
        }
    }

    /// Register an authenticated connection locally and in presence.
    ///
    /// Queues the `{"user": ...}` and `{"users": [...]}` snapshots before
    /// any routed message can reach the connection. When the user is at the
    /// connection cap, the oldest connections are closed first.
    pub async fn activate(
        self: &Arc<Self>,
        lifecycle: ConnectionLifecycle,
        user: &User,
    ) -> AppResult<(Arc<ConnectionHandle>, mpsc::Receiver<Outbound>)> {
        if lifecycle.state() != ConnectionState::Authenticated {
            return Err(AppError::connection_race(format!(
                "Cannot activate a connection that is {}",
                lifecycle.state()
            )));
        }

        self.enforce_connection_cap(user.id()).await;

        let (tx, rx) = mpsc::channel(self.config.channel_buffer_size.max(1));
        let handle = Arc::new(ConnectionHandle::new(
            ConnectionId::new(),
            user.id(),
            user.username(),
            tx,
            lifecycle,
            self.shutdown.child_token(),
        ));

        if let Err(e) = self.push_snapshots(&handle, user).await {
            if handle.lifecycle().begin_closing() {
                let _ = handle.lifecycle().finish_closing();
            }
            return Err(e);
        }

        handle
            .lifecycle()
            .transition(ConnectionState::Authenticated, ConnectionState::Active)?;
        self.registry.add(Arc::clone(&handle));
        connections::record_connect(&self.metrics);
        self.register_presence(&handle).await;

        tokio::spawn(heartbeat::run_heartbeat(Arc::clone(self), Arc::clone(&handle)));

        info!(
            conn_id = %handle.id,
            user_id = %handle.user_id,
            username = %handle.username,
            process_id = %self.process_id,
            "WebSocket connection active"
        );
        Ok((handle, rx))
    }

    /// Process one text frame received from a client.
    ///
    /// Every outcome is reported to the sender as an ack, a pong, or an
    /// error frame. Nothing here closes the connection.
    pub async fn handle_inbound(&self, handle: &ConnectionHandle, raw: &str) {
        handle.touch().await;

        if raw.len() > self.config.max_frame_bytes {
            self.reply(
                handle,
                &ServerFrame::Error {
                    code: "FRAME_TOO_LARGE".to_string(),
                    seq: None,
                    message: format!("Frame exceeds {} bytes", self.config.max_frame_bytes),
                },
            );
            return;
        }

        let frame: ClientFrame = match serde_json::from_str(raw) {
            Ok(frame) => frame,
            Err(e) => {
                self.reply(
                    handle,
                    &ServerFrame::Error {
                        code: "INVALID_MESSAGE".to_string(),
                        seq: None,
                        message: format!("Failed to parse message: {e}"),
                    },
                );
                return;
            }
        };

        messages::record_received(&self.metrics);

        let Some((target, payload)) = frame.into_message() else {
            self.reply(
                handle,
                &ServerFrame::Pong {
                    timestamp: chrono::Utc::now(),
                },
            );
            return;
        };

        let seq = handle.next_seq();
        let envelope = MessageEnvelope::new(handle.user_id, handle.id, target, payload, seq);

        let reply = match self.router.deliver(&envelope).await {
            Ok(report) => ServerFrame::Ack {
                seq,
                delivered: report.delivered(),
            },
            Err(e) => {
                debug!(conn_id = %handle.id, seq, error = %e, "Message not delivered");
                ServerFrame::Error {
                    code: e.kind.to_string(),
                    seq: Some(seq),
                    message: e.message,
                }
            }
        };
        self.reply(handle, &reply);
    }

    /// Close a connection and release its registry and presence entries.
    ///
    /// Only the first call for a given connection does anything.
    pub async fn close(&self, handle: &ConnectionHandle, reason: CloseReason) {
        if !handle.lifecycle().begin_closing() {
            return;
        }

        handle.cancel_token().cancel();
        if let Some((code, text)) = reason.close_frame() {
            let _ = handle.push(Outbound::Close {
                code,
                reason: text.to_string(),
            });
        }

        self.registry.remove(&handle.id);
        self.unregister_presence(handle).await;

        if let Err(e) = handle.lifecycle().finish_closing() {
            debug!(conn_id = %handle.id, error = %e, "Unexpected state while closing");
        }
        connections::record_disconnect(&self.metrics);

        info!(
            conn_id = %handle.id,
            user_id = %handle.user_id,
            reason = %reason,
            "WebSocket connection closed"
        );
    }

    /// Close every connection in this process.
    pub async fn close_all(&self, reason: CloseReason) {
        let all = self.registry.all();
        for handle in &all {
            self.close(handle, reason).await;
        }
        info!(count = all.len(), "All connections closed");
    }

    /// Extend the presence TTL of a live connection, re-registering it if
    /// the entry has already lapsed.
    ///
    /// Does nothing once the connection has started closing, so a refresh
    /// racing `close` cannot leave an entry behind.
    pub async fn refresh_presence(&self, handle: &ConnectionHandle) {
        if !handle.lifecycle().is_active() {
            return;
        }
        match self.presence.heartbeat(handle.user_id, handle.id).await {
            Ok(true) => {}
            Ok(false) => {
                if !handle.lifecycle().is_active() {
                    return;
                }
                debug!(conn_id = %handle.id, "Presence entry lapsed, registering again");
                match self
                    .presence
                    .register(handle.user_id, &self.process_id, handle.id)
                    .await
                {
                    Ok(()) => {
                        if !handle.lifecycle().is_active() {
                            self.withdraw_presence(handle.user_id, handle.id).await;
                        }
                    }
                    Err(e) => {
                        warn!(conn_id = %handle.id, error = %e, "Presence re-registration failed");
                    }
                }
            }
            Err(e) => {
                warn!(conn_id = %handle.id, error = %e, "Presence heartbeat failed");
            }
        }
    }

    /// Users with a live connection anywhere; local users when the
    /// presence store cannot be reached.
    pub async fn online_users(&self) -> HashSet<UserId> {
        match self.presence.online_users().await {
            Ok(users) => users,
            Err(e) => {
                warn!(error = %e, "Presence store unavailable, reporting local users only");
                self.registry.connected_user_ids().into_iter().collect()
            }
        }
    }

    /// Returns the realtime configuration.
    pub fn config(&self) -> &RealtimeConfig {
        &self.config
    }

    /// Returns the presence configuration.
    pub fn presence_config(&self) -> &PresenceConfig {
        &self.presence_config
    }

    /// Returns the connection registry.
    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    /// Returns this process's ID.
    pub fn process_id(&self) -> &ProcessId {
        &self.process_id
    }

    async fn enforce_connection_cap(&self, user_id: UserId) {
        let max = self.config.max_connections_per_user.max(1);
        let existing = self.registry.handles_of_user(&user_id);
        if existing.len() < max {
            return;
        }

        let excess = existing.len() + 1 - max;
        warn!(
            user_id = %user_id,
            count = existing.len(),
            max,
            "User at max connections, closing oldest"
        );
        for oldest in existing.iter().take(excess) {
            self.close(oldest, CloseReason::Evicted).await;
        }
    }

    async fn push_snapshots(&self, handle: &ConnectionHandle, user: &User) -> AppResult<()> {
        let others = self
            .authenticator
            .directory()
            .list_active(Some(user.id()))
            .await?;
        let online = self.online_users().await;

        let users = others
            .iter()
            .map(|u| KnownUser {
                profile: u.profile(),
                online: online.contains(&u.id()),
            })
            .collect();

        let own = serde_json::to_string(&SelfSnapshot {
            user: user.profile(),
        })?;
        let list = serde_json::to_string(&UsersSnapshot { users })?;
        handle.push(Outbound::Frame(own))?;
        handle.push(Outbound::Frame(list))?;
        Ok(())
    }

    async fn register_presence(&self, handle: &ConnectionHandle) {
        let (user_id, conn_id) = (handle.user_id, handle.id);
        match self
            .presence
            .register(user_id, &self.process_id, conn_id)
            .await
        {
            Ok(()) => {}
            Err(e) if e.is_store_unavailable() => {
                warn!(conn_id = %conn_id, error = %e, "Presence register failed, retrying in background");
                let presence = Arc::clone(&self.presence);
                let process_id = self.process_id.clone();
                let closed = handle.cancel_token().clone();
                spawn_retry(
                    self.retry,
                    handle.cancel_token().clone(),
                    Arc::clone(&self.metrics),
                    "presence.register",
                    move || {
                        let presence = Arc::clone(&presence);
                        let process_id = process_id.clone();
                        let closed = closed.clone();
                        async move {
                            if closed.is_cancelled() {
                                return Ok(());
                            }
                            presence.register(user_id, &process_id, conn_id).await?;
                            // `close` cancels before it unregisters; a write
                            // that lands after that must be undone here.
                            if closed.is_cancelled() {
                                presence.unregister(user_id, conn_id).await?;
                            }
                            Ok(())
                        }
                    },
                );
            }
            Err(e) => {
                warn!(conn_id = %conn_id, error = %e, "Presence register failed");
            }
        }
    }

    async fn unregister_presence(&self, handle: &ConnectionHandle) {
        let (user_id, conn_id) = (handle.user_id, handle.id);
        match self.presence.unregister(user_id, conn_id).await {
            Ok(()) => {}
            Err(e) if e.is_store_unavailable() => {
                warn!(conn_id = %conn_id, error = %e, "Presence unregister failed, retrying in background");
                let presence = Arc::clone(&self.presence);
                spawn_retry(
                    self.retry,
                    self.shutdown.clone(),
                    Arc::clone(&self.metrics),
                    "presence.unregister",
                    move || {
                        let presence = Arc::clone(&presence);
                        async move { presence.unregister(user_id, conn_id).await }
                    },
                );
            }
            Err(e) => {
                warn!(conn_id = %conn_id, error = %e, "Presence unregister failed");
            }
        }
    }

    /// Remove an entry written after the connection began closing.
    async fn withdraw_presence(&self, user_id: UserId, conn_id: ConnectionId) {
        if let Err(e) = self.presence.unregister(user_id, conn_id).await {
            warn!(conn_id = %conn_id, error = %e, "Failed to withdraw late presence entry");
        }
    }

    fn reply(&self, handle: &ConnectionHandle, frame: &ServerFrame) {
        let text = match serde_json::to_string(frame) {
            Ok(text) => text,
            Err(e) => {
                warn!(conn_id = %handle.id, error = %e, "Failed to serialize reply");
                return;
            }
        };
        if let Err(e) = handle.send(Outbound::Frame(text)) {
            debug!(conn_id = %handle.id, error = %e, "Reply not sent");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use serde_json::Value;

    use chathub_auth::{MemoryUserDirectory, TokenService};
    use chathub_core::config::AuthConfig;
    use chathub_core::error::ErrorKind;
    use chathub_entity::UserRecord;
    use chathub_store::memory::{MemoryDeliveryBus, MemoryGroupDirectory, MemoryPresenceStore};

    struct Fixture {
        manager: Arc<ConnectionManager>,
        directory: Arc<MemoryUserDirectory>,
        presence: Arc<MemoryPresenceStore>,
        tokens: TokenService,
    }

    fn fixture(max_connections_per_user: usize) -> Fixture {
        let process_id = ProcessId::new("p1");
        let registry = Arc::new(ConnectionRegistry::new());
        let presence = Arc::new(MemoryPresenceStore::new(Duration::from_secs(60)));
        let metrics = Arc::new(EngineMetrics::new());
        let directory = Arc::new(MemoryUserDirectory::new());
        let tokens = TokenService::new(&AuthConfig::default());
        let authenticator = Arc::new(Authenticator::new(directory.clone(), tokens.clone()));
        let router = Arc::new(FanoutRouter::new(
            process_id.clone(),
            Arc::clone(&registry),
            presence.clone(),
            Arc::new(MemoryGroupDirectory::new()),
            Arc::new(MemoryDeliveryBus::new(16)),
            Arc::clone(&metrics),
        ));
        let config = RealtimeConfig {
            max_connections_per_user,
            ..RealtimeConfig::default()
        };
        let manager = Arc::new(ConnectionManager::new(
            process_id,
            registry,
            presence.clone(),
            authenticator,
            router,
            metrics,
            config,
            PresenceConfig::default(),
            CancellationToken::new(),
        ));
        Fixture {
            manager,
            directory,
            presence,
            tokens,
        }
    }

    impl Fixture {
        fn add_user(&self, username: &str, active: bool) -> (User, String) {
            let user = User::try_from(UserRecord {
                id: None,
                username: username.to_string(),
                full_name: None,
                email: None,
                password_hash: "unused".to_string(),
                active: Some(active),
            })
            .unwrap();
            self.directory.insert(user.clone()).unwrap();
            let token = self.tokens.issue(user.id(), user.username()).unwrap().access_token;
            (user, token)
        }
    }

    fn next_frame(rx: &mut mpsc::Receiver<Outbound>) -> Value {
        match rx.try_recv().unwrap() {
            Outbound::Frame(text) => serde_json::from_str(&text).unwrap(),
            other => panic!("expected a text frame, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_connect_sends_snapshots_and_registers_presence() {
        let fx = fixture(5);
        let (alice, token) = fx.add_user("alice", true);
        let (bob, _) = fx.add_user("bob", true);
        fx.add_user("carol", false);

        let (handle, mut rx) = fx.manager.connect(Some(&token)).await.unwrap();
        assert_eq!(handle.state(), ConnectionState::Active);

        let own = next_frame(&mut rx);
        assert_eq!(own["user"]["username"], "alice");
        let list = next_frame(&mut rx);
        let users = list["users"].as_array().unwrap();
        assert_eq!(users.len(), 1);
        assert_eq!(users[0]["id"], bob.id().to_string());
        assert_eq!(users[0]["online"], false);

        let entries = fx.presence.lookup(alice.id()).await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].connection_id, handle.id);
    }

    #[tokio::test]
    async fn test_missing_or_bad_token_is_rejected() {
        let fx = fixture(5);

        let lifecycle = ConnectionLifecycle::new();
        let err = fx.manager.authenticate(&lifecycle, None).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::TokenInvalid);
        assert_eq!(lifecycle.state(), ConnectionState::Closed);

        let err = fx.manager.connect(Some("garbage")).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::TokenInvalid);
        assert_eq!(fx.manager.registry().connection_count(), 0);
    }

    #[tokio::test]
    async fn test_inactive_user_is_rejected() {
        let fx = fixture(5);
        let (_, token) = fx.add_user("dormant", false);

        let err = fx.manager.connect(Some(&token)).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::InactiveUser);
    }

    #[tokio::test]
    async fn test_connection_cap_evicts_oldest() {
        let fx = fixture(2);
        let (alice, token) = fx.add_user("alice", true);

        let (first, mut first_rx) = fx.manager.connect(Some(&token)).await.unwrap();
        let (second, _second_rx) = fx.manager.connect(Some(&token)).await.unwrap();
        let (third, _third_rx) = fx.manager.connect(Some(&token)).await.unwrap();

        assert_eq!(first.state(), ConnectionState::Closed);
        assert_eq!(
            fx.manager.registry().connections_of_user(&alice.id()),
            vec![second.id, third.id]
        );

        next_frame(&mut first_rx);
        next_frame(&mut first_rx);
        assert_eq!(
            first_rx.try_recv().unwrap(),
            Outbound::Close {
                code: 1008,
                reason: "connection limit reached".to_string()
            }
        );
        assert_eq!(fx.presence.lookup(alice.id()).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_inbound_direct_message_is_acked_and_delivered() {
        let fx = fixture(5);
        let (_, alice_token) = fx.add_user("alice", true);
        let (bob, bob_token) = fx.add_user("bob", true);

        let (alice, mut alice_rx) = fx.manager.connect(Some(&alice_token)).await.unwrap();
        let (_, mut bob_rx) = fx.manager.connect(Some(&bob_token)).await.unwrap();
        for rx in [&mut alice_rx, &mut bob_rx] {
            next_frame(rx);
            next_frame(rx);
        }

        let raw = format!(r#"{{"type":"direct","to":"{}","payload":{{"text":"hi"}}}}"#, bob.id());
        fx.manager.handle_inbound(&alice, &raw).await;

        let received = next_frame(&mut bob_rx);
        assert_eq!(received["text"], "hi");
        assert_eq!(received["from"], alice.user_id.to_string());

        let ack = next_frame(&mut alice_rx);
        assert_eq!(ack["type"], "ack");
        assert_eq!(ack["seq"], 1);
        assert_eq!(ack["delivered"], 1);
    }

    #[tokio::test]
    async fn test_inbound_errors_are_reported_to_sender() {
        let fx = fixture(5);
        let (_, token) = fx.add_user("alice", true);
        let (alice, mut rx) = fx.manager.connect(Some(&token)).await.unwrap();
        next_frame(&mut rx);
        next_frame(&mut rx);

        fx.manager.handle_inbound(&alice, "not json").await;
        assert_eq!(next_frame(&mut rx)["code"], "INVALID_MESSAGE");

        let raw = format!(r#"{{"type":"direct","to":"{}","payload":{{}}}}"#, UserId::new());
        fx.manager.handle_inbound(&alice, &raw).await;
        let err = next_frame(&mut rx);
        assert_eq!(err["code"], "TARGET_NOT_FOUND");
        assert_eq!(err["seq"], 1);

        fx.manager.handle_inbound(&alice, r#"{"type":"ping"}"#).await;
        assert_eq!(next_frame(&mut rx)["type"], "pong");
    }

    #[tokio::test]
    async fn test_refresh_after_close_leaves_no_presence() {
        let fx = fixture(5);
        let (_, alice_token) = fx.add_user("alice", true);
        let (bob, bob_token) = fx.add_user("bob", true);
        let (alice, mut alice_rx) = fx.manager.connect(Some(&alice_token)).await.unwrap();
        let (bob_handle, _bob_rx) = fx.manager.connect(Some(&bob_token)).await.unwrap();
        next_frame(&mut alice_rx);
        next_frame(&mut alice_rx);

        fx.manager.close(&bob_handle, CloseReason::ClientClosed).await;
        fx.manager.refresh_presence(&bob_handle).await;

        assert!(fx.presence.lookup(bob.id()).await.unwrap().is_empty());

        let raw = format!(r#"{{"type":"direct","to":"{}","payload":{{}}}}"#, bob.id());
        fx.manager.handle_inbound(&alice, &raw).await;
        assert_eq!(next_frame(&mut alice_rx)["code"], "TARGET_NOT_FOUND");
    }

    #[tokio::test]
    async fn test_refresh_reregisters_lapsed_live_connection() {
        let fx = fixture(5);
        let (alice, token) = fx.add_user("alice", true);
        let (handle, _rx) = fx.manager.connect(Some(&token)).await.unwrap();

        fx.presence.unregister(alice.id(), handle.id).await.unwrap();
        fx.manager.refresh_presence(&handle).await;

        assert_eq!(fx.presence.lookup(alice.id()).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_close_is_idempotent_and_clears_presence() {
        let fx = fixture(5);
        let (alice, token) = fx.add_user("alice", true);
        let (handle, _rx) = fx.manager.connect(Some(&token)).await.unwrap();

        fx.manager.close(&handle, CloseReason::ClientClosed).await;
        fx.manager.close(&handle, CloseReason::TransportError).await;

        assert_eq!(handle.state(), ConnectionState::Closed);
        assert!(handle.cancel_token().is_cancelled());
        assert!(fx.presence.lookup(alice.id()).await.unwrap().is_empty());
        assert_eq!(fx.manager.registry().connection_count(), 0);
    }
}
