//! WebSocket message frames.

pub mod types;

pub use types::{ClientFrame, KnownUser, Outbound, SelfSnapshot, ServerFrame, UsersSnapshot};
