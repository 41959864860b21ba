//! Top-level real-time engine that ties together all subsystems.

use std::sync::Arc;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use chathub_auth::Authenticator;
use chathub_core::config::{PresenceConfig, RealtimeConfig};
use chathub_core::result::AppResult;
use chathub_core::types::ProcessId;
use chathub_store::StoreManager;

use crate::bridge::DeliverySubscriber;
use crate::connection::{CloseReason, ConnectionManager, ConnectionRegistry};
use crate::metrics::EngineMetrics;
use crate::presence::{PresenceReaper, RetryPolicy};
use crate::router::FanoutRouter;

/// Central real-time engine for one server process.
///
/// Owns the connection registry, the router, and the background tasks
/// (delivery subscriber and presence reaper). All of them stop on
/// [`RealtimeEngine::shutdown`].
pub struct RealtimeEngine {
    process_id: ProcessId,
    /// Connection manager.
    pub connections: Arc<ConnectionManager>,
    /// Local connection registry.
    pub registry: Arc<ConnectionRegistry>,
    /// Fan-out router.
    pub router: Arc<FanoutRouter>,
    /// Metrics collector.
    pub metrics: Arc<EngineMetrics>,
    stores: StoreManager,
    presence_config: PresenceConfig,
    shutdown: CancellationToken,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl std::fmt::Debug for RealtimeEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RealtimeEngine")
            .field("process_id", &self.process_id)
            .finish()
    }
}

impl RealtimeEngine {
    /// Creates a new engine wired to the given stores.
    pub fn new(
        process_id: ProcessId,
        stores: StoreManager,
        authenticator: Arc<Authenticator>,
        realtime: RealtimeConfig,
        presence: PresenceConfig,
    ) -> Self {
        let shutdown = CancellationToken::new();
        let metrics = Arc::new(EngineMetrics::new());
        let registry = Arc::new(ConnectionRegistry::new());
        let router = Arc::new(FanoutRouter::new(
            process_id.clone(),
            Arc::clone(&registry),
            stores.presence(),
            stores.groups(),
            stores.bus(),
            Arc::clone(&metrics),
        ));
        let connections = Arc::new(ConnectionManager::new(
            process_id.clone(),
            Arc::clone(&registry),
            stores.presence(),
            authenticator,
            Arc::clone(&router),
            Arc::clone(&metrics),
            realtime,
            presence.clone(),
            shutdown.clone(),
        ));

        info!(process_id = %process_id, "Real-time engine initialized");

        Self {
            process_id,
            connections,
            registry,
            router,
            metrics,
            stores,
            presence_config: presence,
            shutdown,
            tasks: Mutex::new(Vec::new()),
        }
    }

    /// Start the background tasks.
    ///
    /// The delivery subscription is opened before this returns, so messages
    /// published to this process afterwards are not lost.
    pub async fn start(&self) -> AppResult<()> {
        let subscriber = DeliverySubscriber::new(
            self.process_id.clone(),
            self.stores.bus(),
            Arc::clone(&self.router),
            RetryPolicy::from_config(&self.presence_config),
        );
        let stream = subscriber.subscribe().await?;

        let reaper = PresenceReaper::new(
            self.stores.presence(),
            Arc::clone(&self.metrics),
            self.presence_config.sweep_interval(),
        );

        let mut tasks = self.tasks.lock().await;
        tasks.push(tokio::spawn(subscriber.run(stream, self.shutdown.child_token())));
        tasks.push(tokio::spawn(reaper.run(self.shutdown.child_token())));

        info!(process_id = %self.process_id, "Real-time engine started");
        Ok(())
    }

    /// Initiates a graceful shutdown of the real-time engine.
    ///
    /// Closes every connection (removing its presence entries), then stops
    /// the background tasks.
    pub async fn shutdown(&self) -> AppResult<()> {
        info!(process_id = %self.process_id, "Shutting down real-time engine");

        self.connections.close_all(CloseReason::Shutdown).await;
        self.shutdown.cancel();

        let tasks: Vec<JoinHandle<()>> = self.tasks.lock().await.drain(..).collect();
        for task in tasks {
            if let Err(e) = task.await {
                warn!(error = %e, "Background task ended abnormally");
            }
        }

        info!(process_id = %self.process_id, "Real-time engine shut down");
        Ok(())
    }

    /// This process's ID.
    pub fn process_id(&self) -> &ProcessId {
        &self.process_id
    }

    /// The shared stores.
    pub fn stores(&self) -> &StoreManager {
        &self.stores
    }

    /// Whether shutdown has begun.
    pub fn is_shutting_down(&self) -> bool {
        self.shutdown.is_cancelled()
    }
}
