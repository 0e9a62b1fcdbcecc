//! Bearer token authentication
//!
//! Provides:
//! - Authorization header parsing (`Bearer <token>`)
//! - HMAC (HS256/HS384/HS512) JWT validation against a fixed shared secret
//! - An independent expiry re-check on top of the library validation
//! - Token minting for tools and tests

use axum::http::{header::AUTHORIZATION, HeaderMap};
use chrono::{DateTime, Duration, TimeZone, Utc};
use jsonwebtoken::{
    decode, encode, errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header, Validation,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Authentication failures, kept distinct for diagnostics.
///
/// The pipeline collapses `InvalidToken` and `Expired` into a single
/// client-visible 401.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("authorization header missing")]
    MissingHeader,

    #[error("authorization header is not of the form `Bearer <token>`")]
    MalformedHeader,

    #[error("invalid token: {0}")]
    InvalidToken(#[from] jsonwebtoken::errors::Error),

    #[error("token expired")]
    Expired,
}

impl AuthError {
    /// Short reason used in log fields
    pub fn reason(&self) -> &'static str {
        match self {
            AuthError::MissingHeader => "missing",
            AuthError::MalformedHeader => "malformed",
            AuthError::InvalidToken(_) => "invalid",
            AuthError::Expired => "expired",
        }
    }
}

/// JWT claims structure
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (caller identity)
    #[serde(default)]
    pub sub: String,

    /// Expiration time (Unix timestamp). Tokens without one never expire.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exp: Option<i64>,

    /// Issued at (Unix timestamp)
    #[serde(default)]
    pub iat: i64,
}

impl Claims {
    /// Expiry as an instant
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.exp.and_then(|exp| Utc.timestamp_opt(exp, 0).single())
    }

    /// Whether an expiry is present and lies strictly before `now`
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.exp.is_some_and(|exp| exp < now.timestamp())
    }
}

/// JWT token manager
///
/// The secret is fixed at construction; there is no runtime rotation.
pub struct JwtManager {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    expiration_secs: i64,
}

impl JwtManager {
    /// Create a new JWT manager with the given secret
    pub fn new(secret: &str, expiration_secs: u64) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            validation: hmac_validation(),
            expiration_secs: expiration_secs as i64,
        }
    }

    /// Generate a token for `subject` expiring after the configured lifetime
    pub fn generate_token(&self, subject: &str) -> Result<String, AuthError> {
        let exp = Utc::now() + Duration::seconds(self.expiration_secs);
        self.generate_token_expiring_at(subject, exp)
    }

    /// Generate a token with an explicit expiry instant
    pub fn generate_token_expiring_at(
        &self,
        subject: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<String, AuthError> {
        let claims = Claims {
            sub: subject.to_string(),
            exp: Some(expires_at.timestamp()),
            iat: Utc::now().timestamp(),
        };

        Ok(encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)?)
    }

    /// Validate and decode a JWT token
    pub fn validate(&self, token: &str) -> Result<Claims, AuthError> {
        let claims = decode::<Claims>(token, &self.decoding_key, &self.validation)
            .map(|data| data.claims)
            .map_err(|e| classify_failure(token, e))?;

        // The library applies a leeway to `exp`; the gateway does not.
        if claims.is_expired_at(Utc::now()) {
            return Err(AuthError::Expired);
        }

        Ok(claims)
    }
}

/// Any HMAC algorithm under the shared secret; `exp` is optional
fn hmac_validation() -> Validation {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.algorithms = vec![Algorithm::HS256, Algorithm::HS384, Algorithm::HS512];
    validation.required_spec_claims.clear();
    validation
}

/// Map a decode failure to `Expired` whenever the payload carries a past
/// expiry, whether or not the signature verified.
fn classify_failure(token: &str, err: jsonwebtoken::errors::Error) -> AuthError {
    if matches!(err.kind(), ErrorKind::ExpiredSignature) {
        return AuthError::Expired;
    }

    match peek_unverified(token) {
        Some(claims) if claims.is_expired_at(Utc::now()) => AuthError::Expired,
        _ => AuthError::InvalidToken(err),
    }
}

/// Decode the payload without checking the signature. Only used to classify
/// a failure; the result is never trusted.
fn peek_unverified(token: &str) -> Option<Claims> {
    let mut validation = hmac_validation();
    validation.insecure_disable_signature_validation();
    validation.validate_exp = false;

    decode::<Claims>(token, &DecodingKey::from_secret(&[]), &validation)
        .ok()
        .map(|data| data.claims)
}

/// Extract the token from an Authorization header value.
///
/// The value must consist of exactly two whitespace-separated fields, the
/// first being literally `Bearer`.
pub fn extract_bearer_token(header: &str) -> Result<&str, AuthError> {
    let mut parts = header.split_whitespace();

    match (parts.next(), parts.next(), parts.next()) {
        (Some("Bearer"), Some(token), None) => Ok(token),
        _ => Err(AuthError::MalformedHeader),
    }
}

/// Read the Authorization header and extract its bearer token
pub fn bearer_from_headers(headers: &HeaderMap) -> Result<&str, AuthError> {
    let value = headers.get(AUTHORIZATION).ok_or(AuthError::MissingHeader)?;

    if value.is_empty() {
        return Err(AuthError::MissingHeader);
    }

    let value = value.to_str().map_err(|_| AuthError::MalformedHeader)?;
    extract_bearer_token(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    const SECRET: &str = "test_secret";

    #[test]
    fn test_extract_bearer_token() {
        assert_eq!(extract_bearer_token("Bearer abc").unwrap(), "abc");
        assert!(matches!(extract_bearer_token("abc"), Err(AuthError::MalformedHeader)));
        assert!(matches!(extract_bearer_token("Basic abc"), Err(AuthError::MalformedHeader)));
        assert!(matches!(extract_bearer_token(""), Err(AuthError::MalformedHeader)));
        assert!(matches!(extract_bearer_token("Bearer a b"), Err(AuthError::MalformedHeader)));
        assert!(matches!(extract_bearer_token("bearer abc"), Err(AuthError::MalformedHeader)));
        assert!(matches!(extract_bearer_token("Bearer"), Err(AuthError::MalformedHeader)));
    }

    #[test]
    fn test_bearer_from_headers() {
        let mut headers = HeaderMap::new();
        assert!(matches!(bearer_from_headers(&headers), Err(AuthError::MissingHeader)));

        headers.insert(AUTHORIZATION, HeaderValue::from_static(""));
        assert!(matches!(bearer_from_headers(&headers), Err(AuthError::MissingHeader)));

        headers.insert(AUTHORIZATION, HeaderValue::from_static("Token xyz"));
        assert!(matches!(bearer_from_headers(&headers), Err(AuthError::MalformedHeader)));

        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer xyz"));
        assert_eq!(bearer_from_headers(&headers).unwrap(), "xyz");
    }

    #[test]
    fn test_jwt_roundtrip() {
        let manager = JwtManager::new(SECRET, 3600);

        let token = manager.generate_token("client-42").unwrap();
        let claims = manager.validate(&token).unwrap();

        assert_eq!(claims.sub, "client-42");
        assert!(claims.exp.unwrap() > claims.iat);
        assert!(claims.expires_at().unwrap() > Utc::now());
    }

    #[test]
    fn test_expired_token_beyond_leeway() {
        let manager = JwtManager::new(SECRET, 3600);
        let token = manager
            .generate_token_expiring_at("client", Utc::now() - Duration::seconds(600))
            .unwrap();

        assert!(matches!(manager.validate(&token), Err(AuthError::Expired)));
    }

    #[test]
    fn test_expired_token_within_library_leeway() {
        let manager = JwtManager::new(SECRET, 3600);
        let token = manager
            .generate_token_expiring_at("client", Utc::now() - Duration::seconds(5))
            .unwrap();

        assert!(matches!(manager.validate(&token), Err(AuthError::Expired)));
    }

    #[test]
    fn test_expired_token_with_wrong_signature() {
        let issuer = JwtManager::new("some_other_secret", 3600);
        let manager = JwtManager::new(SECRET, 3600);
        let token = issuer
            .generate_token_expiring_at("client", Utc::now() - Duration::seconds(600))
            .unwrap();

        assert!(matches!(manager.validate(&token), Err(AuthError::Expired)));
    }

    #[test]
    fn test_wrong_signature_is_invalid() {
        let issuer = JwtManager::new("some_other_secret", 3600);
        let manager = JwtManager::new(SECRET, 3600);
        let token = issuer.generate_token("client").unwrap();

        assert!(matches!(manager.validate(&token), Err(AuthError::InvalidToken(_))));
    }

    #[test]
    fn test_garbage_token_is_invalid() {
        let manager = JwtManager::new(SECRET, 3600);

        let err = manager.validate("not.a.jwt").unwrap_err();
        assert!(matches!(err, AuthError::InvalidToken(_)));
        assert_eq!(err.reason(), "invalid");
    }

    #[test]
    fn test_token_without_expiry_accepted() {
        let manager = JwtManager::new(SECRET, 3600);
        let claims = Claims {
            sub: "service".to_string(),
            exp: None,
            iat: Utc::now().timestamp(),
        };
        let token = encode(&Header::new(Algorithm::HS256), &claims, &manager.encoding_key).unwrap();

        let decoded = manager.validate(&token).unwrap();
        assert_eq!(decoded.sub, "service");
        assert_eq!(decoded.exp, None);
        assert!(decoded.expires_at().is_none());
    }

    #[test]
    fn test_token_without_expiry_wrong_signature_is_invalid() {
        let issuer = JwtManager::new("some_other_secret", 3600);
        let manager = JwtManager::new(SECRET, 3600);
        let claims = Claims { sub: "service".to_string(), exp: None, iat: 0 };
        let token = encode(&Header::new(Algorithm::HS256), &claims, &issuer.encoding_key).unwrap();

        assert!(matches!(manager.validate(&token), Err(AuthError::InvalidToken(_))));
    }

    #[test]
    fn test_other_hmac_algorithms_accepted() {
        let manager = JwtManager::new(SECRET, 3600);
        let claims = Claims {
            sub: "client".to_string(),
            exp: Some((Utc::now() + Duration::seconds(60)).timestamp()),
            iat: Utc::now().timestamp(),
        };

        for alg in [Algorithm::HS384, Algorithm::HS512] {
            let token = encode(&Header::new(alg), &claims, &manager.encoding_key).unwrap();
            assert_eq!(manager.validate(&token).unwrap().sub, "client");
        }
    }
}
