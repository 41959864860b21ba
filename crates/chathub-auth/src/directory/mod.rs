//! User directory: the read side of account data.

pub mod memory;

use std::fmt::Debug;

use async_trait::async_trait;

use chathub_core::result::AppResult;
use chathub_core::types::UserId;
use chathub_entity::User;

pub use memory::MemoryUserDirectory;

/// Lookup of registered users.
///
/// Account administration lives outside this system; the directory only
/// answers questions about users that already exist.
#[async_trait]
pub trait UserDirectory: Send + Sync + Debug + 'static {
    /// Find a user by ID.
    async fn find_by_id(&self, user_id: UserId) -> AppResult<Option<User>>;

    /// Find a user by login name (case-insensitive).
    async fn find_by_username(&self, username: &str) -> AppResult<Option<User>>;

    /// Active users, optionally excluding one, ordered by username.
    async fn list_active(&self, exclude: Option<UserId>) -> AppResult<Vec<User>>;
}
