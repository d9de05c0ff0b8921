//! services/api/src/token.rs
//!
//! Issues and verifies the signed bearer tokens handed out at login.
//!
//! A token only proves who it was issued to and until when. Whether it may
//! still be used is decided by the session row created alongside it.

use chrono::{DateTime, Duration, TimeZone, Utc};
use jsonwebtoken::{
    decode, encode, errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header, Validation,
};
use serde::{Deserialize, Serialize};
use sigmora_core::domain::SESSION_TTL_HOURS;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TokenError {
    #[error("Token expired")]
    Expired,
    #[error("Invalid token")]
    Invalid,
    #[error("Malformed token")]
    Malformed,
    #[error("Failed to sign token: {0}")]
    Signing(String),
}

/// Claims embedded in every access token.
#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    /// Subject: the user id.
    sub: String,
    iat: i64,
    exp: i64,
    /// Makes two tokens issued to one user within the same second distinct.
    jti: String,
}

/// A freshly signed token and the instant it stops being accepted.
#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

pub struct TokenService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    ttl: Duration,
}

impl TokenService {
    pub fn new(secret: &str) -> Self {
        Self::with_ttl(secret, Duration::hours(SESSION_TTL_HOURS))
    }

    pub fn with_ttl(secret: &str, ttl: Duration) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp", "sub"]);
        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            validation,
            ttl,
        }
    }

    pub fn issue(&self, user_id: Uuid) -> Result<IssuedToken, TokenError> {
        let now = Utc::now();
        // Whole seconds, so the session expiry matches the `exp` claim exactly.
        let expires_at = Utc
            .timestamp_opt((now + self.ttl).timestamp(), 0)
            .single()
            .ok_or_else(|| TokenError::Signing("expiry out of range".to_string()))?;
        let claims = Claims {
            sub: user_id.to_string(),
            iat: now.timestamp(),
            exp: expires_at.timestamp(),
            jti: Uuid::new_v4().to_string(),
        };
        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| TokenError::Signing(e.to_string()))?;
        Ok(IssuedToken { token, expires_at })
    }

    /// Returns the user id the token was issued to.
    pub fn verify(&self, token: &str) -> Result<Uuid, TokenError> {
        let data = decode::<Claims>(token, &self.decoding_key, &self.validation).map_err(|e| {
            match e.kind() {
                ErrorKind::ExpiredSignature => TokenError::Expired,
                ErrorKind::InvalidToken
                | ErrorKind::InvalidSignature
                | ErrorKind::InvalidAlgorithm
                | ErrorKind::Base64(_)
                | ErrorKind::Json(_)
                | ErrorKind::Utf8(_) => TokenError::Invalid,
                _ => TokenError::Malformed,
            }
        })?;
        Uuid::parse_str(&data.claims.sub).map_err(|_| TokenError::Malformed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn issued_token_verifies_to_its_user() {
        let tokens = TokenService::new("test-secret");
        let user_id = Uuid::new_v4();
        let issued = tokens.issue(user_id).unwrap();

        assert_eq!(tokens.verify(&issued.token).unwrap(), user_id);
        let ttl = issued.expires_at - Utc::now();
        assert!(ttl > Duration::hours(4) && ttl <= Duration::hours(5));
    }

    #[test]
    fn back_to_back_tokens_differ() {
        let tokens = TokenService::new("test-secret");
        let user_id = Uuid::new_v4();
        assert_ne!(tokens.issue(user_id).unwrap().token, tokens.issue(user_id).unwrap().token);
    }

    #[test]
    fn expired_token_is_reported_as_expired() {
        let tokens = TokenService::with_ttl("test-secret", Duration::seconds(-30));
        let issued = tokens.issue(Uuid::new_v4()).unwrap();
        assert_eq!(tokens.verify(&issued.token), Err(TokenError::Expired));
    }

    #[test]
    fn foreign_signature_is_invalid() {
        let ours = TokenService::new("test-secret");
        let theirs = TokenService::new("another-secret");
        let issued = theirs.issue(Uuid::new_v4()).unwrap();
        assert_eq!(ours.verify(&issued.token), Err(TokenError::Invalid));
    }

    #[test]
    fn garbage_is_rejected() {
        let tokens = TokenService::new("test-secret");
        assert_eq!(tokens.verify("not-a-jwt"), Err(TokenError::Invalid));
    }

    #[test]
    fn non_uuid_subject_is_malformed() {
        let secret = "test-secret";
        let claims = Claims {
            sub: "42".to_string(),
            iat: Utc::now().timestamp(),
            exp: (Utc::now() + Duration::hours(1)).timestamp(),
            jti: "x".to_string(),
        };
        let token = encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .unwrap();
        assert_eq!(TokenService::new(secret).verify(&token), Err(TokenError::Malformed));
    }
}
