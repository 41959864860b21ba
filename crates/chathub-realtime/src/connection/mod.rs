//! WebSocket connection management: lifecycle, registry, handles, heartbeat.

pub mod handle;
pub mod heartbeat;
pub mod lifecycle;
pub mod manager;
pub mod registry;

#[cfg(test)]
pub(crate) mod testing;

pub use handle::{ConnectionHandle, ConnectionInfo};
pub use lifecycle::{ConnectionLifecycle, ConnectionState};
pub use manager::{CloseReason, ConnectionManager};
pub use registry::ConnectionRegistry;
