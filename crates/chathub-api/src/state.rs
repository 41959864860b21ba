//! Application state shared across all handlers.

use std::sync::Arc;

use chathub_auth::Authenticator;
use chathub_core::config::AppConfig;
use chathub_realtime::RealtimeEngine;
use chathub_store::{GroupDirectory, PresenceStore};

/// Application state containing all shared dependencies.
///
/// Passed to every Axum handler via `State<AppState>`.
/// All fields are `Arc`-wrapped for cheap cloning across tasks.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Application configuration
    pub config: Arc<AppConfig>,
    /// Credential and token authenticator
    pub authenticator: Arc<Authenticator>,
    /// WebSocket realtime engine
    pub engine: Arc<RealtimeEngine>,
}

impl AppState {
    /// Bundle the shared components.
    pub fn new(
        config: Arc<AppConfig>,
        authenticator: Arc<Authenticator>,
        engine: Arc<RealtimeEngine>,
    ) -> Self {
        Self {
            config,
            authenticator,
            engine,
        }
    }

    /// Group directory shared by all processes.
    pub fn groups(&self) -> Arc<dyn GroupDirectory> {
        self.engine.stores().groups()
    }

    /// Presence store shared by all processes.
    pub fn presence(&self) -> Arc<dyn PresenceStore> {
        self.engine.stores().presence()
    }
}
