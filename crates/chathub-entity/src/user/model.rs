//! User entity model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use chathub_core::error::AppError;
use chathub_core::types::UserId;

/// A registered user.
///
/// Only constructed through [`User::try_from`] so every instance has passed
/// boundary validation. Immutable except for the active flag, which account
/// administration toggles.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    /// Stable unique identifier.
    id: UserId,
    /// Unique login name.
    username: String,
    /// Human-readable name.
    full_name: Option<String>,
    /// Email address.
    email: Option<String>,
    /// Password hash (PHC string).
    #[serde(skip_serializing)]
    password_hash: String,
    /// Whether the account may log in and connect.
    active: bool,
    /// When the user was created.
    created_at: DateTime<Utc>,
}

/// Raw user data as it arrives from a backing store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserRecord {
    /// Identifier, if the store assigns one.
    pub id: Option<UserId>,
    /// Login name.
    pub username: String,
    /// Human-readable name.
    pub full_name: Option<String>,
    /// Email address.
    pub email: Option<String>,
    /// Password hash (PHC string).
    pub password_hash: String,
    /// Active flag; absent means active.
    pub active: Option<bool>,
}

impl TryFrom<UserRecord> for User {
    type Error = AppError;

    fn try_from(record: UserRecord) -> Result<Self, Self::Error> {
        let username = record.username.trim().to_string();
        if username.is_empty() {
            return Err(AppError::validation("Username must not be empty"));
        }
        if username.chars().any(char::is_whitespace) {
            return Err(AppError::validation(format!(
                "Username '{username}' must not contain whitespace"
            )));
        }
        if record.password_hash.is_empty() {
            return Err(AppError::validation(format!(
                "User '{username}' has no password hash"
            )));
        }

        let email = match record.email {
            Some(email) if email.trim().is_empty() => None,
            Some(email) => {
                let email = email.trim().to_string();
                let valid = email
                    .split_once('@')
                    .is_some_and(|(local, domain)| !local.is_empty() && domain.contains('.'));
                if !valid {
                    return Err(AppError::validation(format!(
                        "User '{username}' has a malformed email address"
                    )));
                }
                Some(email)
            }
            None => None,
        };

        Ok(Self {
            id: record.id.unwrap_or_default(),
            username,
            full_name: record.full_name.filter(|n| !n.trim().is_empty()),
            email,
            password_hash: record.password_hash,
            active: record.active.unwrap_or(true),
            created_at: Utc::now(),
        })
    }
}

impl User {
    /// User identifier.
    pub fn id(&self) -> UserId {
        self.id
    }

    /// Login name.
    pub fn username(&self) -> &str {
        &self.username
    }

    /// Stored password hash.
    pub fn password_hash(&self) -> &str {
        &self.password_hash
    }

    /// Whether the account may log in and connect.
    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Toggle the active flag.
    pub fn set_active(&mut self, active: bool) {
        self.active = active;
    }

    /// Public projection of this user.
    pub fn profile(&self) -> UserProfile {
        UserProfile {
            id: self.id,
            username: self.username.clone(),
            full_name: self.full_name.clone(),
            email: self.email.clone(),
            active: self.active,
            created_at: self.created_at,
        }
    }
}

/// User data safe to send to clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    /// User ID.
    pub id: UserId,
    /// Login name.
    pub username: String,
    /// Human-readable name.
    pub full_name: Option<String>,
    /// Email address.
    pub email: Option<String>,
    /// Active flag.
    pub active: bool,
    /// Creation time.
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chathub_core::error::ErrorKind;

    fn record(username: &str, email: Option<&str>) -> UserRecord {
        UserRecord {
            id: None,
            username: username.to_string(),
            full_name: Some("John Doe".to_string()),
            email: email.map(str::to_string),
            password_hash: "$argon2id$v=19$stub".to_string(),
            active: None,
        }
    }

    #[test]
    fn test_valid_record_parses() {
        let user = User::try_from(record("johndoe", Some("johndoe@example.com"))).unwrap();
        assert_eq!(user.username(), "johndoe");
        assert!(user.is_active());
        assert_eq!(user.profile().email.as_deref(), Some("johndoe@example.com"));
    }

    #[test]
    fn test_blank_username_rejected() {
        let err = User::try_from(record("   ", None)).unwrap_err();
        assert_eq!(err.kind, ErrorKind::Validation);
    }

    #[test]
    fn test_malformed_email_rejected() {
        let err = User::try_from(record("alice", Some("not-an-email"))).unwrap_err();
        assert_eq!(err.kind, ErrorKind::Validation);
    }

    #[test]
    fn test_profile_never_serializes_hash() {
        let user = User::try_from(record("johndoe", None)).unwrap();
        let json = serde_json::to_value(&user).unwrap();
        assert!(json.get("password_hash").is_none());
    }
}
