//! Route definitions for the ChatHub HTTP API.

use std::time::Duration;

use axum::Router;
use axum::http::{HeaderValue, Method};
use axum::routing::{delete, get, post};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use chathub_core::config::CorsConfig;

use crate::handlers;
use crate::state::AppState;

/// Build the complete Axum router with all routes and middleware.
pub fn build_router(state: AppState) -> Router {
    let cors = build_cors_layer(&state.config.server.cors);

    Router::new()
        .merge(auth_routes())
        .merge(user_routes())
        .merge(group_routes())
        .route("/ws/chat", get(handlers::ws::ws_upgrade))
        .route("/health", get(handlers::health::health))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/auth/login", post(handlers::auth::login))
        .route("/auth/refresh", post(handlers::auth::refresh))
}

fn user_routes() -> Router<AppState> {
    Router::new()
        .route("/users/me", get(handlers::user::me))
        .route("/users/me/groups", get(handlers::user::my_groups))
        .route("/all_users", get(handlers::user::all_users))
}

fn group_routes() -> Router<AppState> {
    Router::new()
        .route("/groups", post(handlers::group::create_group))
        .route("/groups/{id}", get(handlers::group::get_group))
        .route("/groups/{id}/members", post(handlers::group::add_member))
        .route(
            "/groups/{id}/members/{user_id}",
            delete(handlers::group::remove_member),
        )
}

/// CORS layer from configuration. `*` allows any origin.
fn build_cors_layer(config: &CorsConfig) -> CorsLayer {
    let layer = if config.allowed_origins.iter().any(|o| o == "*") {
        CorsLayer::new().allow_origin(Any)
    } else {
        let origins: Vec<HeaderValue> = config
            .allowed_origins
            .iter()
            .filter_map(|o| o.parse().ok())
            .collect();
        CorsLayer::new().allow_origin(origins)
    };

    layer
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers(Any)
        .max_age(Duration::from_secs(config.max_age_seconds))
}
