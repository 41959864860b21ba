//! Maps domain `AppError` to HTTP responses.

use axum::Json;
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};

use chathub_core::error::{AppError, ErrorKind};

/// Standard API error response body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiErrorResponse {
    /// Machine-readable error code.
    pub error: String,
    /// Human-readable message.
    pub message: String,
}

/// HTTP-facing wrapper around [`AppError`].
///
/// Handlers return `Result<_, ApiError>` and use `?` on anything that
/// yields an `AppError`.
#[derive(Debug)]
pub struct ApiError(pub AppError);

impl From<AppError> for ApiError {
    fn from(err: AppError) -> Self {
        Self(err)
    }
}

/// Status code for an error kind.
pub fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::AuthInvalid
        | ErrorKind::TokenInvalid
        | ErrorKind::TokenExpired
        | ErrorKind::InactiveUser => StatusCode::UNAUTHORIZED,
        ErrorKind::TargetNotFound | ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::Validation | ErrorKind::Serialization => StatusCode::BAD_REQUEST,
        ErrorKind::Conflict | ErrorKind::ConnectionRace => StatusCode::CONFLICT,
        ErrorKind::StoreUnavailable => StatusCode::SERVICE_UNAVAILABLE,
        ErrorKind::Configuration | ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let err = self.0;
        let status = status_for(err.kind);
        if status.is_server_error() {
            tracing::error!(error = %err, "Request failed");
        }

        let body = ApiErrorResponse {
            error: err.kind.to_string(),
            message: err.message,
        };

        if status == StatusCode::UNAUTHORIZED {
            (status, [(header::WWW_AUTHENTICATE, "Bearer")], Json(body)).into_response()
        } else {
            (status, Json(body)).into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auth_failures_are_unauthorized() {
        for kind in [
            ErrorKind::AuthInvalid,
            ErrorKind::TokenInvalid,
            ErrorKind::TokenExpired,
            ErrorKind::InactiveUser,
        ] {
            assert_eq!(status_for(kind), StatusCode::UNAUTHORIZED);
        }
    }

    #[test]
    fn test_unauthorized_response_carries_challenge() {
        let response = ApiError(AppError::token_expired("expired")).into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(response.headers()[header::WWW_AUTHENTICATE], "Bearer");
    }

    #[test]
    fn test_store_outage_is_service_unavailable() {
        let response = ApiError(AppError::store_unavailable("down")).into_response();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }
}
