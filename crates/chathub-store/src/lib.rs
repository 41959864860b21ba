//! # chathub-store
//!
//! Shared state for ChatHub processes:
//!
//! - **presence**: user → live connection locations, with TTL expiry
//! - **groups**: group → members, with the reverse index
//! - **bus**: the channel carrying envelopes to the process that owns a connection
//!
//! Each concern has an in-memory backend (single process, tests) and a
//! Redis backend (clusters). The backend is selected at runtime based on
//! configuration.

pub mod keys;
#[cfg(feature = "memory")]
pub mod memory;
pub mod provider;
#[cfg(feature = "redis-backend")]
pub mod redis;
pub mod traits;

pub use provider::StoreManager;
pub use traits::{DeliveryBus, GroupDirectory, PresenceStore};
