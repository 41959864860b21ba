//! In-memory user directory seeded from configuration.

use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tracing::info;

use chathub_core::config::SeedUser;
use chathub_core::error::AppError;
use chathub_core::result::AppResult;
use chathub_core::types::UserId;
use chathub_entity::{User, UserRecord};

use super::UserDirectory;
use crate::password::PasswordHasher;

/// User directory held in process memory.
#[derive(Debug, Default)]
pub struct MemoryUserDirectory {
    users: DashMap<UserId, User>,
    by_username: DashMap<String, UserId>,
}

impl MemoryUserDirectory {
    /// Create an empty directory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a directory from seed users, hashing their passwords.
    pub fn from_seed(seed: &[SeedUser], hasher: &PasswordHasher) -> AppResult<Self> {
        let directory = Self::new();
        for entry in seed {
            let id = match entry.id.as_deref() {
                Some(raw) => Some(raw.parse::<UserId>().map_err(|_| {
                    AppError::configuration(format!(
                        "Seed user '{}' has an invalid id '{raw}'",
                        entry.username
                    ))
                })?),
                None => None,
            };

            let user = User::try_from(UserRecord {
                id,
                username: entry.username.clone(),
                full_name: entry.full_name.clone(),
                email: entry.email.clone(),
                password_hash: hasher.hash_password(&entry.password)?,
                active: Some(entry.active),
            })?;
            directory.insert(user)?;
        }

        info!(users = directory.users.len(), "User directory seeded");
        Ok(directory)
    }

    /// Add a user. Usernames and IDs must be unique.
    pub fn insert(&self, user: User) -> AppResult<()> {
        let username = user.username().to_lowercase();
        match self.by_username.entry(username) {
            Entry::Occupied(_) => Err(AppError::conflict(format!(
                "Username '{}' is already taken",
                user.username()
            ))),
            Entry::Vacant(slot) => {
                if self.users.contains_key(&user.id()) {
                    return Err(AppError::conflict(format!(
                        "User ID {} is already taken",
                        user.id()
                    )));
                }
                slot.insert(user.id());
                self.users.insert(user.id(), user);
                Ok(())
            }
        }
    }

    /// Toggle a user's active flag.
    pub fn set_active(&self, user_id: UserId, active: bool) -> AppResult<()> {
        let mut user = self
            .users
            .get_mut(&user_id)
            .ok_or_else(|| AppError::not_found(format!("User {user_id} not found")))?;
        user.set_active(active);
        Ok(())
    }
}

#[async_trait]
impl UserDirectory for MemoryUserDirectory {
    async fn find_by_id(&self, user_id: UserId) -> AppResult<Option<User>> {
        Ok(self.users.get(&user_id).map(|u| u.clone()))
    }

    async fn find_by_username(&self, username: &str) -> AppResult<Option<User>> {
        let Some(id) = self.by_username.get(&username.to_lowercase()).map(|id| *id) else {
            return Ok(None);
        };
        self.find_by_id(id).await
    }

    async fn list_active(&self, exclude: Option<UserId>) -> AppResult<Vec<User>> {
        let mut users: Vec<User> = self
            .users
            .iter()
            .filter(|u| u.is_active() && Some(u.id()) != exclude)
            .map(|u| u.clone())
            .collect();
        users.sort_by(|a, b| a.username().cmp(b.username()));
        Ok(users)
    }
}
