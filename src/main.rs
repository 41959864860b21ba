//! ChatHub Server: real-time chat backend.
//!
//! Main entry point that wires all crates together and starts the server.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing_subscriber::{EnvFilter, fmt};

use chathub_api::{AppState, build_router};
use chathub_auth::{Authenticator, MemoryUserDirectory, PasswordHasher, TokenService};
use chathub_core::config::AppConfig;
use chathub_core::error::AppError;
use chathub_realtime::RealtimeEngine;
use chathub_store::StoreManager;

#[tokio::main]
async fn main() {
    let env = std::env::var("CHATHUB_ENV").unwrap_or_else(|_| "development".to_string());

    let config = match AppConfig::load(&env) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load configuration: {e}");
            std::process::exit(1);
        }
    };

    init_logging(&config);
    tracing::info!(env = %env, "Configuration loaded");

    if let Err(e) = run(config).await {
        tracing::error!("Server error: {}", e);
        std::process::exit(1);
    }
}

/// Initialize tracing/logging
fn init_logging(config: &AppConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.logging.level));

    match config.logging.format.as_str() {
        "json" => {
            fmt()
                .json()
                .with_env_filter(filter)
                .with_target(true)
                .with_thread_ids(true)
                .init();
        }
        _ => {
            fmt()
                .pretty()
                .with_env_filter(filter)
                .with_target(true)
                .init();
        }
    }
}

/// Main server run function
async fn run(config: AppConfig) -> Result<(), AppError> {
    tracing::info!("Starting ChatHub v{}", env!("CARGO_PKG_VERSION"));

    let process_id = config.cluster.resolve_process_id();
    tracing::info!(
        process_id = %process_id,
        store = %config.store.provider,
        "Initializing shared stores"
    );
    let stores = StoreManager::new(&config.store, &config.presence, &config.cluster).await?;

    let directory = Arc::new(MemoryUserDirectory::from_seed(
        &config.users,
        &PasswordHasher::new(),
    )?);
    let authenticator = Arc::new(Authenticator::new(
        directory,
        TokenService::new(&config.auth),
    ));

    let engine = Arc::new(RealtimeEngine::new(
        process_id,
        stores,
        Arc::clone(&authenticator),
        config.realtime.clone(),
        config.presence.clone(),
    ));
    engine.start().await?;

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let grace = Duration::from_secs(config.server.shutdown_grace_seconds);
    let state = AppState::new(Arc::new(config), authenticator, Arc::clone(&engine));
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| AppError::internal(format!("Failed to bind {addr}: {e}")))?;
    tracing::info!("Listening on {}", addr);

    let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
    let mut server = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.changed().await;
            })
            .await
    });

    tokio::select! {
        _ = shutdown_signal() => {}
        result = &mut server => {
            return match result {
                Ok(Ok(())) => Ok(()),
                Ok(Err(e)) => Err(AppError::internal(format!("Server error: {e}"))),
                Err(e) => Err(AppError::internal(format!("Server task failed: {e}"))),
            };
        }
    }

    tracing::info!("Shutdown signal received, closing connections...");
    if let Err(e) = engine.shutdown().await {
        tracing::warn!("Engine shutdown incomplete: {}", e);
    }
    let _ = shutdown_tx.send(true);

    match tokio::time::timeout(grace, server).await {
        Ok(Ok(Ok(()))) => {}
        Ok(Ok(Err(e))) => return Err(AppError::internal(format!("Server error: {e}"))),
        Ok(Err(e)) => return Err(AppError::internal(format!("Server task failed: {e}"))),
        Err(_) => tracing::warn!("Graceful shutdown timed out after {:?}", grace),
    }

    tracing::info!("ChatHub server shut down gracefully");
    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
