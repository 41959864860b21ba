//! # chathub-auth
//!
//! Authentication for ChatHub.
//!
//! ## Modules
//!
//! - `jwt`: stateless token service: HS256 access/refresh pairs
//! - `password`: Argon2id password hashing
//! - `directory`: user lookup, with an in-memory directory seeded from configuration
//! - `authenticator`: credential exchange and token-to-user resolution

pub mod authenticator;
pub mod directory;
pub mod jwt;
pub mod password;

pub use authenticator::Authenticator;
pub use directory::{MemoryUserDirectory, UserDirectory};
pub use jwt::{Claims, TokenPair, TokenService};
pub use password::PasswordHasher;
