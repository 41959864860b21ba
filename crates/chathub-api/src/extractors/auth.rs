//! `AuthUser` extractor: resolves the caller from a bearer token or the
//! `access_token` cookie.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum_extra::TypedHeader;
use axum_extra::headers::authorization::Bearer;
use axum_extra::headers::{Authorization, Cookie};

use chathub_core::error::AppError;
use chathub_entity::User;

use crate::error::ApiError;
use crate::state::AppState;

/// Name of the cookie set on login.
pub const ACCESS_TOKEN_COOKIE: &str = "access_token";

/// The authenticated, active user making the request.
#[derive(Debug, Clone)]
pub struct AuthUser(pub User);

impl std::ops::Deref for AuthUser {
    type Target = User;
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let bearer = TypedHeader::<Authorization<Bearer>>::from_request_parts(parts, state)
            .await
            .ok()
            .map(|TypedHeader(Authorization(bearer))| bearer.token().to_string());

        let token = match bearer {
            Some(token) => token,
            None => TypedHeader::<Cookie>::from_request_parts(parts, state)
                .await
                .ok()
                .and_then(|TypedHeader(cookie)| {
                    cookie.get(ACCESS_TOKEN_COOKIE).map(str::to_string)
                })
                .ok_or_else(|| AppError::token_invalid("Not authenticated"))?,
        };

        let user = state.authenticator.authenticate(&token).await?;
        Ok(AuthUser(user))
    }
}
