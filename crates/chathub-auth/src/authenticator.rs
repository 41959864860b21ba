//! Credential verification and token-to-user resolution.

use std::sync::Arc;

use tracing::{info, warn};

use chathub_core::error::AppError;
use chathub_core::result::AppResult;
use chathub_core::types::UserId;
use chathub_entity::User;

use crate::directory::UserDirectory;
use crate::jwt::{TokenPair, TokenService};
use crate::password::PasswordHasher;

/// Exchanges credentials for tokens and resolves tokens back to users.
#[derive(Debug, Clone)]
pub struct Authenticator {
    directory: Arc<dyn UserDirectory>,
    tokens: TokenService,
    hasher: PasswordHasher,
    /// Verified against on unknown usernames so every login pays one Argon2 check.
    dummy_hash: Option<String>,
}

/// Placeholder hashed at startup. No user can own it.
const DUMMY_PASSWORD: &str = "chathub-unknown-user";

impl Authenticator {
    /// Create an authenticator.
    pub fn new(directory: Arc<dyn UserDirectory>, tokens: TokenService) -> Self {
        let hasher = PasswordHasher::new();
        let dummy_hash = match hasher.hash_password(DUMMY_PASSWORD) {
            Ok(hash) => Some(hash),
            Err(e) => {
                warn!("Unknown-user login checks will skip hashing: {}", e);
                None
            }
        };
        Self {
            directory,
            tokens,
            hasher,
            dummy_hash,
        }
    }

    /// Verify a username/password pair and issue tokens.
    ///
    /// Unknown users and wrong passwords fail identically with `AuthInvalid`.
    pub async fn login(&self, username: &str, password: &str) -> AppResult<(User, TokenPair)> {
        let Some(user) = self.directory.find_by_username(username).await? else {
            if let Some(hash) = &self.dummy_hash {
                let _ = self.hasher.verify_password(password, hash);
            }
            warn!(username, "Login failed: unknown user");
            return Err(AppError::auth_invalid("Incorrect username or password"));
        };

        if !self.hasher.verify_password(password, user.password_hash())? {
            warn!(username, "Login failed: wrong password");
            return Err(AppError::auth_invalid("Incorrect username or password"));
        }

        if !user.is_active() {
            warn!(username, "Login refused: inactive user");
            return Err(AppError::inactive_user("User account is inactive"));
        }

        let pair = self.tokens.issue(user.id(), user.username())?;
        info!(user_id = %user.id(), "User logged in");
        Ok((user, pair))
    }

    /// Resolve an access token to an active user.
    pub async fn authenticate(&self, access_token: &str) -> AppResult<User> {
        let claims = self.tokens.validate(access_token)?;
        self.active_user(claims.user_id()).await
    }

    /// Exchange a refresh token for a new pair, re-checking the account.
    pub async fn refresh(&self, refresh_token: &str) -> AppResult<TokenPair> {
        let claims = self.tokens.validate_refresh(refresh_token)?;
        let user = self.active_user(claims.user_id()).await?;
        self.tokens.issue(user.id(), user.username())
    }

    /// The user directory.
    pub fn directory(&self) -> &Arc<dyn UserDirectory> {
        &self.directory
    }

    /// The token service.
    pub fn tokens(&self) -> &TokenService {
        &self.tokens
    }

    async fn active_user(&self, user_id: UserId) -> AppResult<User> {
        let user = self
            .directory
            .find_by_id(user_id)
            .await?
            .ok_or_else(|| AppError::token_invalid("Token subject no longer exists"))?;

        if !user.is_active() {
            return Err(AppError::inactive_user("User account is inactive"));
        }
        Ok(user)
    }
}
