//! # chathub-api
//!
//! HTTP API layer for ChatHub built on Axum.
//!
//! Provides the login and group administration endpoints, the WebSocket
//! upgrade, extractors, DTOs, and error mapping.

pub mod dto;
pub mod error;
pub mod extractors;
pub mod handlers;
pub mod router;
pub mod state;

pub use error::ApiError;
pub use router::build_router;
pub use state::AppState;
