//! In-memory backends for single-process deployments and tests.

pub mod bus;
pub mod groups;
pub mod presence;

pub use bus::MemoryDeliveryBus;
pub use groups::MemoryGroupDirectory;
pub use presence::MemoryPresenceStore;
