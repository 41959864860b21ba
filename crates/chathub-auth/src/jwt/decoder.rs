//! JWT token validation.

use jsonwebtoken::errors::ErrorKind as JwtErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode};

use chathub_core::config::AuthConfig;
use chathub_core::error::AppError;

use super::claims::{Claims, TokenType};

/// Validates signature, expiry, and token type.
#[derive(Clone)]
pub struct JwtDecoder {
    /// HMAC secret key for verification.
    decoding_key: DecodingKey,
    /// Validation configuration.
    validation: Validation,
}

impl std::fmt::Debug for JwtDecoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwtDecoder")
            .field("validation", &self.validation)
            .finish()
    }
}

impl JwtDecoder {
    /// Creates a new decoder from auth configuration.
    pub fn new(config: &AuthConfig) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = true;
        validation.leeway = config.leeway_seconds;

        Self {
            decoding_key: DecodingKey::from_secret(config.jwt_secret.as_bytes()),
            validation,
        }
    }

    /// Decodes and validates an access token string.
    pub fn decode_access_token(&self, token: &str) -> Result<Claims, AppError> {
        self.decode_typed(token, TokenType::Access)
    }

    /// Decodes and validates a refresh token string.
    pub fn decode_refresh_token(&self, token: &str) -> Result<Claims, AppError> {
        self.decode_typed(token, TokenType::Refresh)
    }

    fn decode_typed(&self, token: &str, expected: TokenType) -> Result<Claims, AppError> {
        let claims = decode::<Claims>(token, &self.decoding_key, &self.validation)
            .map_err(|e| match e.kind() {
                JwtErrorKind::ExpiredSignature => AppError::token_expired("Token has expired"),
                JwtErrorKind::InvalidSignature => {
                    AppError::token_invalid("Invalid token signature")
                }
                JwtErrorKind::InvalidToken => AppError::token_invalid("Invalid token format"),
                _ => AppError::token_invalid(format!("Token validation failed: {e}")),
            })?
            .claims;

        if claims.token_type != expected {
            return Err(AppError::token_invalid(format!(
                "Invalid token type: expected {expected:?} token"
            )));
        }
        Ok(claims)
    }
}
