//! Route handlers organized by domain.

pub mod auth;
pub mod group;
pub mod health;
pub mod user;
pub mod ws;
