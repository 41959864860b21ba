//! Unified application error types for ChatHub.
//!
//! All crates map their internal errors into [`AppError`] for consistent
//! propagation through the ? operator.

use std::fmt;
use thiserror::Error;

/// Top-level error kind categorization used across the entire application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum ErrorKind {
    /// Username or password did not match.
    AuthInvalid,
    /// Token signature, format, or type was rejected.
    TokenInvalid,
    /// Token signature was valid but the token has expired.
    TokenExpired,
    /// The account exists but its active flag is false.
    InactiveUser,
    /// A message was addressed to a user or group that cannot be reached.
    TargetNotFound,
    /// An operation raced with a connection that is already closing or closed.
    ConnectionRace,
    /// The presence store or group directory could not be reached.
    StoreUnavailable,
    /// The requested resource was not found.
    NotFound,
    /// Input validation failed.
    Validation,
    /// A conflict occurred (duplicate entry, concurrent modification, etc.).
    Conflict,
    /// A serialization/deserialization error occurred.
    Serialization,
    /// A configuration error occurred.
    Configuration,
    /// An internal server error occurred.
    Internal,
}

impl ErrorKind {
    /// Returns `true` for the authentication family of errors.
    pub fn is_auth_failure(&self) -> bool {
        matches!(
            self,
            Self::AuthInvalid | Self::TokenInvalid | Self::TokenExpired | Self::InactiveUser
        )
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AuthInvalid => write!(f, "AUTH_INVALID"),
            Self::TokenInvalid => write!(f, "TOKEN_INVALID"),
            Self::TokenExpired => write!(f, "TOKEN_EXPIRED"),
            Self::InactiveUser => write!(f, "INACTIVE_USER"),
            Self::TargetNotFound => write!(f, "TARGET_NOT_FOUND"),
            Self::ConnectionRace => write!(f, "CONNECTION_RACE"),
            Self::StoreUnavailable => write!(f, "STORE_UNAVAILABLE"),
            Self::NotFound => write!(f, "NOT_FOUND"),
            Self::Validation => write!(f, "VALIDATION"),
            Self::Conflict => write!(f, "CONFLICT"),
            Self::Serialization => write!(f, "SERIALIZATION"),
            Self::Configuration => write!(f, "CONFIGURATION"),
            Self::Internal => write!(f, "INTERNAL"),
        }
    }
}

/// The unified application error used throughout ChatHub.
///
/// All crate-specific errors are mapped into `AppError` using `From` impls
/// or explicit `.map_err()` calls.
#[derive(Debug, Error)]
#[error("{kind}: {message}")]
pub struct AppError {
    /// The category of error.
    pub kind: ErrorKind,
    /// A human-readable error message.
    pub message: String,
    /// Optional underlying cause.
    #[source]
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl AppError {
    /// Create a new application error.
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            source: None,
        }
    }

    /// Create a new application error with an underlying cause.
    pub fn with_source(
        kind: ErrorKind,
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self {
            kind,
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create a bad-credentials error.
    pub fn auth_invalid(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::AuthInvalid, message)
    }

    /// Create an invalid-token error.
    pub fn token_invalid(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::TokenInvalid, message)
    }

    /// Create an expired-token error.
    pub fn token_expired(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::TokenExpired, message)
    }

    /// Create an inactive-user error.
    pub fn inactive_user(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InactiveUser, message)
    }

    /// Create a target-not-found error.
    pub fn target_not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::TargetNotFound, message)
    }

    /// Create a connection-race error.
    pub fn connection_race(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ConnectionRace, message)
    }

    /// Create a store-unavailable error.
    pub fn store_unavailable(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::StoreUnavailable, message)
    }

    /// Create a not-found error.
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, message)
    }

    /// Create a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Validation, message)
    }

    /// Create a conflict error.
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Conflict, message)
    }

    /// Create a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Configuration, message)
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal, message)
    }

    /// Returns `true` when the error means shared state could not be reached.
    pub fn is_store_unavailable(&self) -> bool {
        self.kind == ErrorKind::StoreUnavailable
    }
}

impl Clone for AppError {
    fn clone(&self) -> Self {
        Self {
            kind: self.kind,
            message: self.message.clone(),
            source: None,
        }
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        Self::with_source(
            ErrorKind::Serialization,
            format!("JSON serialization error: {err}"),
            err,
        )
    }
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        Self::with_source(
            ErrorKind::Configuration,
            format!("Configuration error: {err}"),
            err,
        )
    }
}
