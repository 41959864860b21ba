//! Request DTOs with validation.

use serde::{Deserialize, Serialize};
use validator::Validate;

use chathub_core::error::AppError;
use chathub_core::types::UserId;

/// Login form (`application/x-www-form-urlencoded`).
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct LoginForm {
    /// Username.
    #[validate(length(min = 1, message = "Username is required"))]
    pub username: String,
    /// Password.
    #[validate(length(min = 1, message = "Password is required"))]
    pub password: String,
}

/// Token refresh request body.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct RefreshRequest {
    /// Refresh token.
    #[validate(length(min = 1, message = "Refresh token is required"))]
    pub refresh_token: String,
}

/// Create group request.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CreateGroupRequest {
    /// Display name.
    #[validate(length(min = 1, max = 100, message = "Group name must be 1-100 characters"))]
    pub name: String,
    /// Initial members. The creator is always added.
    #[validate(length(min = 1, message = "A group needs at least one member"))]
    pub members: Vec<UserId>,
}

/// Add member request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddMemberRequest {
    /// User to add.
    pub user_id: UserId,
}

/// Query for `GET /all_users`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AllUsersQuery {
    /// User to leave out of the listing.
    pub exclude: Option<UserId>,
}

/// Query for the WebSocket upgrade.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WsQuery {
    /// Access token; browsers cannot set headers on WebSocket requests.
    pub access_token: Option<String>,
}

/// Run `validator` rules, mapping failures to a `Validation` error.
pub fn validate<T: Validate>(req: &T) -> Result<(), AppError> {
    req.validate()
        .map_err(|e| AppError::validation(format!("Invalid request: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chathub_core::error::ErrorKind;

    #[test]
    fn test_empty_member_list_rejected() {
        let req = CreateGroupRequest {
            name: "team".to_string(),
            members: Vec::new(),
        };
        assert_eq!(validate(&req).unwrap_err().kind, ErrorKind::Validation);
    }

    #[test]
    fn test_blank_login_rejected() {
        let form = LoginForm {
            username: String::new(),
            password: "x".to_string(),
        };
        assert!(validate(&form).is_err());
    }
}
