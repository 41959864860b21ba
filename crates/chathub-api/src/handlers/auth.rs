//! Auth handlers: login and refresh.

use axum::extract::State;
use axum::http::{HeaderValue, header};
use axum::response::{IntoResponse, Response};
use axum::{Form, Json};

use chathub_core::error::AppError;

use crate::dto::request::{LoginForm, RefreshRequest, validate};
use crate::dto::response::TokenResponse;
use crate::error::ApiError;
use crate::extractors::auth::ACCESS_TOKEN_COOKIE;
use crate::state::AppState;

/// Cookie carrying the refresh token.
pub const REFRESH_TOKEN_COOKIE: &str = "refresh_token";

/// POST /auth/login
///
/// Accepts an OAuth2 password form. Returns the token pair as JSON and also
/// sets both tokens as cookies so browser clients can open the WebSocket
/// without handling headers.
pub async fn login(
    State(state): State<AppState>,
    Form(form): Form<LoginForm>,
) -> Result<Response, ApiError> {
    validate(&form)?;

    let (_user, tokens) = state
        .authenticator
        .login(&form.username, &form.password)
        .await?;

    let max_age = state.config.auth.cookie_max_age_seconds;
    let access_cookie = token_cookie(ACCESS_TOKEN_COOKIE, &tokens.access_token, max_age)?;
    let refresh_cookie = token_cookie(REFRESH_TOKEN_COOKIE, &tokens.refresh_token, max_age)?;

    let mut response = Json(TokenResponse::from(tokens)).into_response();
    let headers = response.headers_mut();
    headers.append(header::SET_COOKIE, access_cookie);
    headers.append(header::SET_COOKIE, refresh_cookie);
    Ok(response)
}

/// POST /auth/refresh
pub async fn refresh(
    State(state): State<AppState>,
    Json(req): Json<RefreshRequest>,
) -> Result<Json<TokenResponse>, ApiError> {
    validate(&req)?;
    let tokens = state.authenticator.refresh(&req.refresh_token).await?;
    Ok(Json(TokenResponse::from(tokens)))
}

fn token_cookie(name: &str, value: &str, max_age: u64) -> Result<HeaderValue, AppError> {
    HeaderValue::from_str(&format!(
        "{name}={value}; Max-Age={max_age}; Path=/; Secure; SameSite=Strict"
    ))
    .map_err(|e| AppError::internal(format!("Invalid cookie value: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cookie_attributes() {
        let cookie = token_cookie("access_token", "abc", 1800).unwrap();
        let text = cookie.to_str().unwrap();
        assert!(text.starts_with("access_token=abc;"));
        assert!(text.contains("Max-Age=1800"));
        assert!(text.contains("SameSite=Strict"));
        assert!(text.contains("Secure"));
    }
}
