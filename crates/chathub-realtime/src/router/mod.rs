//! Message routing.

pub mod fanout;

pub use fanout::{DeliveryReport, FanoutRouter};
