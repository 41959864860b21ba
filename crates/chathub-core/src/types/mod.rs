//! Shared value types.

pub mod id;

pub use id::{ConnectionId, GroupId, MessageId, ProcessId, UserId};
