//! JWT token issuance and validation.
//!
//! Dual-token system: short-lived access tokens (15 minutes, stateless) and
//! long-lived refresh tokens (7 days, database-tracked via their `jti`).
//! Each token kind is signed with its own secret so a leaked access-token
//! secret cannot be used to forge refresh tokens, and vice versa.

use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

/// Token type for distinguishing access vs refresh tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenType {
    /// Short-lived access token (15 minutes) - stateless, no JTI
    Access,
    /// Long-lived refresh token (7 days) - tracked in database with JTI
    Refresh,
}

/// JWT claims for access tokens (stateless, no JTI).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessClaims {
    /// Subject (user UUID)
    pub sub: String,
    /// Token type
    #[serde(rename = "typ")]
    pub token_type: TokenType,
    /// Issued at (Unix timestamp)
    pub iat: u64,
    /// Expiration time (Unix timestamp)
    pub exp: u64,
}

/// JWT claims for refresh tokens (tracked with JTI).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshClaims {
    /// JWT ID (unique identifier for revocation tracking)
    pub jti: String,
    /// Subject (user UUID)
    pub sub: String,
    /// Token type
    #[serde(rename = "typ")]
    pub token_type: TokenType,
    /// Issued at (Unix timestamp)
    pub iat: u64,
    /// Expiration time (Unix timestamp)
    pub exp: u64,
}

/// Access token duration: 15 minutes
pub const ACCESS_TOKEN_DURATION_SECS: u64 = 15 * 60;

/// Refresh token duration: 7 days
pub const REFRESH_TOKEN_DURATION_SECS: u64 = 7 * 24 * 60 * 60;

/// Configuration for JWT operations.
///
/// Holds one key pair per token kind.
#[derive(Clone)]
pub struct JwtConfig {
    access_encoding_key: EncodingKey,
    access_decoding_key: DecodingKey,
    refresh_encoding_key: EncodingKey,
    refresh_decoding_key: DecodingKey,
}

/// Result of issuing an access token (no JTI).
#[derive(Debug, Clone)]
pub struct AccessTokenResult {
    /// The JWT token string
    pub token: String,
    /// Token duration in seconds
    pub duration: u64,
}

/// Result of issuing a refresh token (with JTI for tracking).
#[derive(Debug, Clone)]
pub struct RefreshTokenResult {
    /// The JWT token string
    pub token: String,
    /// JWT ID (unique identifier for database tracking)
    pub jti: String,
    /// Issued at timestamp (Unix seconds)
    pub issued_at: u64,
    /// Expiration timestamp (Unix seconds)
    pub expires_at: u64,
    /// Token duration in seconds
    pub duration: u64,
}

impl JwtConfig {
    /// Create a new JWT configuration with distinct secrets per token kind.
    pub fn new(access_secret: &[u8], refresh_secret: &[u8]) -> Self {
        Self {
            access_encoding_key: EncodingKey::from_secret(access_secret),
            access_decoding_key: DecodingKey::from_secret(access_secret),
            refresh_encoding_key: EncodingKey::from_secret(refresh_secret),
            refresh_decoding_key: DecodingKey::from_secret(refresh_secret),
        }
    }

    /// Issue an access token for a user.
    /// Access tokens are short-lived (15 minutes), stateless, and have no JTI.
    pub fn issue_access_token(&self, user_uuid: &str) -> Result<AccessTokenResult, JwtError> {
        let now = unix_now()?;
        let exp = now + ACCESS_TOKEN_DURATION_SECS;

        let claims = AccessClaims {
            sub: user_uuid.to_string(),
            token_type: TokenType::Access,
            iat: now,
            exp,
        };

        let token = jsonwebtoken::encode(&Header::default(), &claims, &self.access_encoding_key)
            .map_err(JwtError::Encoding)?;

        Ok(AccessTokenResult {
            token,
            duration: ACCESS_TOKEN_DURATION_SECS,
        })
    }

    /// Issue a refresh token for a user.
    /// Refresh tokens are long-lived (7 days). The caller is responsible for
    /// persisting the returned JTI so the token can be revoked later.
    pub fn issue_refresh_token(&self, user_uuid: &str) -> Result<RefreshTokenResult, JwtError> {
        let now = unix_now()?;
        let jti = uuid::Uuid::new_v4().to_string();
        let exp = now + REFRESH_TOKEN_DURATION_SECS;

        let claims = RefreshClaims {
            jti: jti.clone(),
            sub: user_uuid.to_string(),
            token_type: TokenType::Refresh,
            iat: now,
            exp,
        };

        let token = jsonwebtoken::encode(&Header::default(), &claims, &self.refresh_encoding_key)
            .map_err(JwtError::Encoding)?;

        Ok(RefreshTokenResult {
            token,
            jti,
            issued_at: now,
            expires_at: exp,
            duration: REFRESH_TOKEN_DURATION_SECS,
        })
    }

    /// Validate and decode an access token.
    pub fn validate_access_token(&self, token: &str) -> Result<AccessClaims, JwtError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;

        let token_data =
            jsonwebtoken::decode::<AccessClaims>(token, &self.access_decoding_key, &validation)
                .map_err(JwtError::Decoding)?;

        if token_data.claims.token_type != TokenType::Access {
            return Err(JwtError::WrongTokenType);
        }

        Ok(token_data.claims)
    }

    /// Validate and decode a refresh token.
    pub fn validate_refresh_token(&self, token: &str) -> Result<RefreshClaims, JwtError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;

        let token_data =
            jsonwebtoken::decode::<RefreshClaims>(token, &self.refresh_decoding_key, &validation)
                .map_err(JwtError::Decoding)?;

        if token_data.claims.token_type != TokenType::Refresh {
            return Err(JwtError::WrongTokenType);
        }

        Ok(token_data.claims)
    }
}

/// Current Unix timestamp in seconds.
fn unix_now() -> Result<u64, JwtError> {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .map_err(|_| JwtError::TimeError)
}

/// Errors that can occur during JWT operations.
#[derive(Debug, thiserror::Error)]
pub enum JwtError {
    /// Error encoding the token
    #[error("Failed to encode token: {0}")]
    Encoding(jsonwebtoken::errors::Error),
    /// Error decoding the token
    #[error("Failed to decode token: {0}")]
    Decoding(jsonwebtoken::errors::Error),
    /// System time error
    #[error("System time error")]
    TimeError,
    /// Wrong token type (e.g., using refresh token as access token)
    #[error("Wrong token type")]
    WrongTokenType,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> JwtConfig {
        JwtConfig::new(
            b"test-access-secret-for-testing",
            b"test-refresh-secret-for-testing",
        )
    }

    #[test]
    fn test_issue_and_validate_access_token() {
        let config = test_config();

        let result = config.issue_access_token("uuid-123").unwrap();
        assert_eq!(result.duration, ACCESS_TOKEN_DURATION_SECS);

        let claims = config.validate_access_token(&result.token).unwrap();
        assert_eq!(claims.sub, "uuid-123");
        assert_eq!(claims.token_type, TokenType::Access);
        assert_eq!(claims.exp, claims.iat + ACCESS_TOKEN_DURATION_SECS);
    }

    #[test]
    fn test_issue_and_validate_refresh_token() {
        let config = test_config();

        let result = config.issue_refresh_token("uuid-123").unwrap();
        assert_eq!(result.duration, REFRESH_TOKEN_DURATION_SECS);
        assert!(!result.jti.is_empty());

        let claims = config.validate_refresh_token(&result.token).unwrap();
        assert_eq!(claims.sub, "uuid-123");
        assert_eq!(claims.token_type, TokenType::Refresh);
        assert_eq!(claims.jti, result.jti);
    }

    #[test]
    fn test_wrong_token_kind_rejected() {
        let config = test_config();

        let access = config.issue_access_token("uuid-123").unwrap();
        let refresh = config.issue_refresh_token("uuid-123").unwrap();

        // Access token should fail validate_refresh_token
        assert!(config.validate_refresh_token(&access.token).is_err());

        // Refresh token should fail validate_access_token
        assert!(config.validate_access_token(&refresh.token).is_err());
    }

    #[test]
    fn test_secrets_are_independent() {
        // A token signed with the access secret must not verify as a refresh
        // token even when the claims shape matches.
        let config = test_config();
        let now = unix_now().unwrap();

        let forged = RefreshClaims {
            jti: "forged-jti".to_string(),
            sub: "uuid-123".to_string(),
            token_type: TokenType::Refresh,
            iat: now,
            exp: now + 60,
        };
        let token = jsonwebtoken::encode(
            &Header::default(),
            &forged,
            &EncodingKey::from_secret(b"test-access-secret-for-testing"),
        )
        .unwrap();

        assert!(config.validate_refresh_token(&token).is_err());
    }

    #[test]
    fn test_invalid_token() {
        let config = test_config();

        let result = config.validate_access_token("invalid-token");
        assert!(result.is_err());
    }

    #[test]
    fn test_wrong_secret() {
        let config1 = JwtConfig::new(b"access-secret-1", b"refresh-secret-1");
        let config2 = JwtConfig::new(b"access-secret-2", b"refresh-secret-2");

        let result = config1.issue_access_token("uuid-123").unwrap();
        assert!(config2.validate_access_token(&result.token).is_err());
    }

    #[test]
    fn test_expired_token() {
        let now = unix_now().unwrap();

        // Create claims with exp in the past
        let claims = AccessClaims {
            sub: "uuid-123".to_string(),
            token_type: TokenType::Access,
            iat: now - 100,
            exp: now - 50, // Expired 50 seconds ago
        };

        let token = jsonwebtoken::encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(b"test-access-secret-for-testing"),
        )
        .unwrap();

        let config = test_config();
        assert!(config.validate_access_token(&token).is_err());
    }

    #[test]
    fn test_unique_jti_per_refresh_token() {
        let config = test_config();

        let result1 = config.issue_refresh_token("uuid-123").unwrap();
        let result2 = config.issue_refresh_token("uuid-123").unwrap();

        assert_ne!(
            result1.jti, result2.jti,
            "Each refresh token should have a unique jti"
        );
    }
}
