//! Presence entity.

pub mod model;

pub use model::PresenceEntry;
