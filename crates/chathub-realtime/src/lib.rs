//! # chathub-realtime
//!
//! Real-time WebSocket engine for ChatHub. Provides:
//!
//! - Connection lifecycle management with token authentication
//! - A per-process connection registry with a per-user connection cap
//! - Fan-out of direct and group messages to local and remote connections
//! - A cross-process delivery subscriber
//! - Presence heartbeats, TTL eviction, and background store retries

pub mod bridge;
pub mod connection;
pub mod message;
pub mod metrics;
pub mod presence;
pub mod router;
pub mod server;

pub use connection::{CloseReason, ConnectionHandle, ConnectionManager, ConnectionRegistry};
pub use message::Outbound;
pub use metrics::{EngineMetrics, MetricsSnapshot};
pub use router::{DeliveryReport, FanoutRouter};
pub use server::RealtimeEngine;
