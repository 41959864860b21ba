//! Health check handler.

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use tracing::warn;

use crate::dto::response::{ApiResponse, HealthResponse};
use crate::state::AppState;

/// GET /health
///
/// Reports 503 when the shared store does not answer, since cross-process
/// routing and presence are unavailable in that state.
pub async fn health(State(state): State<AppState>) -> (StatusCode, Json<ApiResponse<HealthResponse>>) {
    let store_healthy = match state.presence().health_check().await {
        Ok(healthy) => healthy,
        Err(e) => {
            warn!(error = %e, "Store health check failed");
            false
        }
    };

    let engine = &state.engine;
    let status = if store_healthy && !engine.is_shutting_down() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        status,
        Json(ApiResponse::ok(HealthResponse {
            status: if status == StatusCode::OK { "ok" } else { "degraded" }.to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            process_id: engine.process_id().to_string(),
            store_healthy,
            connections: engine.registry.connection_count(),
            users: engine.registry.user_count(),
            metrics: engine.metrics.snapshot(),
        })),
    )
}
