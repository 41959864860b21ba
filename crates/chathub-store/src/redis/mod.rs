//! Redis backends for multi-process deployments.

pub mod bus;
pub mod client;
pub mod groups;
pub mod presence;

pub use bus::RedisDeliveryBus;
pub use client::RedisClient;
pub use groups::RedisGroupDirectory;
pub use presence::RedisPresenceStore;
