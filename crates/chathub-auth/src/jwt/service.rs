//! Stateless token service combining the encoder and decoder.

use chathub_core::config::AuthConfig;
use chathub_core::result::AppResult;
use chathub_core::types::UserId;

use super::claims::Claims;
use super::decoder::JwtDecoder;
use super::encoder::{JwtEncoder, TokenPair};

/// Issues and validates signed, time-limited tokens.
///
/// A pure function of the server secret and the clock; holds no state
/// beyond its keys.
#[derive(Debug, Clone)]
pub struct TokenService {
    encoder: JwtEncoder,
    decoder: JwtDecoder,
}

impl TokenService {
    /// Build the service from auth configuration.
    pub fn new(config: &AuthConfig) -> Self {
        Self {
            encoder: JwtEncoder::new(config),
            decoder: JwtDecoder::new(config),
        }
    }

    /// Issue an access + refresh pair for a subject.
    pub fn issue(&self, user_id: UserId, username: &str) -> AppResult<TokenPair> {
        self.encoder.generate_token_pair(user_id, username)
    }

    /// Validate an access token.
    pub fn validate(&self, token: &str) -> AppResult<Claims> {
        self.decoder.decode_access_token(token)
    }

    /// Validate a refresh token.
    pub fn validate_refresh(&self, token: &str) -> AppResult<Claims> {
        self.decoder.decode_refresh_token(token)
    }

    /// Exchange a valid refresh token for a new pair.
    pub fn refresh(&self, refresh_token: &str) -> AppResult<TokenPair> {
        let claims = self.validate_refresh(refresh_token)?;
        self.issue(claims.sub, &claims.username)
    }

    /// The underlying encoder.
    pub fn encoder(&self) -> &JwtEncoder {
        &self.encoder
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jwt::claims::TokenType;
    use chathub_core::error::ErrorKind;

    fn config() -> AuthConfig {
        AuthConfig {
            jwt_secret: "a-test-secret-that-is-long-enough".to_string(),
            ..AuthConfig::default()
        }
    }

    #[test]
    fn test_issue_then_validate_round_trips_subject() {
        let service = TokenService::new(&config());
        let user = UserId::new();

        let pair = service.issue(user, "johndoe").unwrap();
        let claims = service.validate(&pair.access_token).unwrap();
        assert_eq!(claims.user_id(), user);
        assert_eq!(claims.username, "johndoe");
        assert!(pair.refresh_expires_at > pair.access_expires_at);
    }

    #[test]
    fn test_expired_token_fails_with_expired() {
        let service = TokenService::new(&config());
        let claims = Claims::new(UserId::new(), "johndoe", TokenType::Access, -10);
        let token = service.encoder().encode_claims(&claims).unwrap();

        let err = service.validate(&token).unwrap_err();
        assert_eq!(err.kind, ErrorKind::TokenExpired);
    }

    #[test]
    fn test_bad_signature_is_invalid() {
        let pair = TokenService::new(&config())
            .issue(UserId::new(), "johndoe")
            .unwrap();
        let other = TokenService::new(&AuthConfig {
            jwt_secret: "another-secret-of-enough-length".to_string(),
            ..AuthConfig::default()
        });

        let err = other.validate(&pair.access_token).unwrap_err();
        assert_eq!(err.kind, ErrorKind::TokenInvalid);
    }

    #[test]
    fn test_malformed_token_is_invalid() {
        let err = TokenService::new(&config())
            .validate("not-a-jwt")
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::TokenInvalid);
    }

    #[test]
    fn test_token_types_are_not_interchangeable() {
        let service = TokenService::new(&config());
        let pair = service.issue(UserId::new(), "johndoe").unwrap();

        assert_eq!(
            service.validate(&pair.refresh_token).unwrap_err().kind,
            ErrorKind::TokenInvalid
        );
        assert_eq!(
            service.validate_refresh(&pair.access_token).unwrap_err().kind,
            ErrorKind::TokenInvalid
        );
    }

    #[test]
    fn test_refresh_issues_new_pair_for_same_subject() {
        let service = TokenService::new(&config());
        let user = UserId::new();
        let pair = service.issue(user, "johndoe").unwrap();

        let renewed = service.refresh(&pair.refresh_token).unwrap();
        assert_eq!(service.validate(&renewed.access_token).unwrap().sub, user);
    }
}
