//! # chathub-entity
//!
//! Domain entity models for ChatHub: users, groups, presence entries, and message envelopes.
//! Every record crossing a store boundary is parsed into these types, so
//! the rest of the system never handles loosely-typed documents.

pub mod group;
pub mod message;
pub mod presence;
pub mod user;

pub use group::Group;
pub use message::{MessageEnvelope, RemoteDelivery, Target};
pub use presence::PresenceEntry;
pub use user::{User, UserProfile, UserRecord};
