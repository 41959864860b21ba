//! Bridge between the cross-process delivery bus and local connections.

pub mod subscriber;

pub use subscriber::DeliverySubscriber;
