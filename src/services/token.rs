//! Bearer tokens shared with the external auth service.
//!
//! Tokens are HS256 JWTs carrying the user ID in `sub`. Expiry is checked
//! against the caller-supplied clock rather than the library's.

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{
    decode, encode, errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header, Validation,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum TokenError {
    #[error("Malformed token")]
    Malformed,

    #[error("Invalid token signature")]
    BadSignature,

    #[error("Token expired")]
    Expired,

    #[error("Token could not be signed")]
    Signing,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub iat: i64,
    pub exp: i64,
}

#[derive(Clone)]
pub struct TokenKey {
    encoding: EncodingKey,
    decoding: DecodingKey,
}

impl TokenKey {
    pub fn from_secret(secret: &str) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
        }
    }
}

pub fn issue_token(
    key: &TokenKey,
    user_id: Uuid,
    ttl: Duration,
    now: DateTime<Utc>,
) -> Result<String, TokenError> {
    let claims = Claims {
        sub: user_id,
        iat: now.timestamp(),
        exp: (now + ttl).timestamp(),
    };

    encode(&Header::new(Algorithm::HS256), &claims, &key.encoding).map_err(|e| {
        tracing::error!(error = %e, "Failed to sign token");
        TokenError::Signing
    })
}

pub fn verify_token(key: &TokenKey, token: &str, now: DateTime<Utc>) -> Result<Claims, TokenError> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.validate_exp = false;

    let claims = decode::<Claims>(token, &key.decoding, &validation)
        .map_err(|e| match e.kind() {
            ErrorKind::InvalidSignature => TokenError::BadSignature,
            ErrorKind::ExpiredSignature => TokenError::Expired,
            _ => TokenError::Malformed,
        })?
        .claims;

    if claims.exp <= now.timestamp() {
        return Err(TokenError::Expired);
    }

    Ok(claims)
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};

    #[test]
    fn test_issued_token_verifies() {
        let key = TokenKey::from_secret("test-secret");
        let user_id = Uuid::new_v4();
        let now = Utc::now();

        let token = issue_token(&key, user_id, Duration::hours(1), now).unwrap();
        let claims = verify_token(&key, &token, now).unwrap();

        assert_eq!(claims.sub, user_id);
        assert_eq!(claims.exp - claims.iat, 3600);
    }

    #[test]
    fn test_issued_token_is_hs256_jwt() {
        let key = TokenKey::from_secret("test-secret");
        let token = issue_token(&key, Uuid::new_v4(), Duration::hours(1), Utc::now()).unwrap();

        let header = jsonwebtoken::decode_header(&token).unwrap();
        assert_eq!(header.alg, Algorithm::HS256);
        assert_eq!(token.split('.').count(), 3);
    }

    #[test]
    fn test_expired_token_rejected() {
        let key = TokenKey::from_secret("test-secret");
        let now = Utc::now();
        let token = issue_token(&key, Uuid::new_v4(), Duration::hours(1), now).unwrap();

        let later = now + Duration::hours(2);
        assert_eq!(verify_token(&key, &token, later), Err(TokenError::Expired));
    }

    #[test]
    fn test_wrong_key_fails() {
        let now = Utc::now();
        let token = issue_token(
            &TokenKey::from_secret("key-one"),
            Uuid::new_v4(),
            Duration::hours(1),
            now,
        )
        .unwrap();

        assert_eq!(
            verify_token(&TokenKey::from_secret("key-two"), &token, now),
            Err(TokenError::BadSignature)
        );
    }

    #[test]
    fn test_tampered_payload_fails() {
        let key = TokenKey::from_secret("test-secret");
        let now = Utc::now();
        let token = issue_token(&key, Uuid::new_v4(), Duration::hours(1), now).unwrap();
        let parts: Vec<&str> = token.split('.').collect();

        let forged_claims = Claims {
            sub: Uuid::new_v4(),
            iat: now.timestamp(),
            exp: (now + Duration::days(365)).timestamp(),
        };
        let forged = format!(
            "{}.{}.{}",
            parts[0],
            URL_SAFE_NO_PAD.encode(serde_json::to_vec(&forged_claims).unwrap()),
            parts[2]
        );

        assert_eq!(verify_token(&key, &forged, now), Err(TokenError::BadSignature));
    }

    #[test]
    fn test_garbage_is_malformed() {
        let key = TokenKey::from_secret("test-secret");
        assert_eq!(verify_token(&key, "not-a-token", Utc::now()), Err(TokenError::Malformed));
        assert_eq!(verify_token(&key, "abc.zz", Utc::now()), Err(TokenError::Malformed));
    }
}
