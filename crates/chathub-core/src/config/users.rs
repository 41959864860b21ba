//! Seed users for the in-memory user directory.

use serde::{Deserialize, Serialize};

/// A user loaded into the directory at startup.
///
/// Passwords are given in plain text and hashed when the directory is built.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeedUser {
    /// Stable user ID; generated when absent.
    #[serde(default)]
    pub id: Option<String>,
    /// Unique login name.
    pub username: String,
    /// Plain-text password.
    pub password: String,
    /// Human-readable name.
    #[serde(default)]
    pub full_name: Option<String>,
    /// Email address.
    #[serde(default)]
    pub email: Option<String>,
    /// Whether the account may log in and connect.
    #[serde(default = "default_true")]
    pub active: bool,
}

fn default_true() -> bool {
    true
}
