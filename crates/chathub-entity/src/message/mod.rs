//! Message entity.

pub mod envelope;

pub use envelope::{MessageEnvelope, RemoteDelivery, Target};
