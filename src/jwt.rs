//! JWT access token validation.
//!
//! Tokens are HMAC-signed with a single process-wide secret. The identity
//! carried downstream comes from two claims: `userId` (custom) and `sub`
//! (the user's email).

use axum::http::HeaderValue;
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

/// Raw JWT payload as it appears on the wire.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenClaims {
    /// Internal user identifier
    #[serde(rename = "userId", default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    /// Subject (user email)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub: Option<String>,
    /// Issued at (Unix timestamp)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iat: Option<u64>,
    /// Expiration time (Unix timestamp)
    pub exp: u64,
}

/// Identity claims of a token that passed validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Claims {
    pub user_id: String,
    pub email: String,
    pub expiry: u64,
}

/// Classified validation failure. None of these carry key material.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenError {
    /// Not a parseable JWT (bad segments, base64 or JSON)
    Malformed,
    /// Signature valid but `exp` is in the past
    Expired,
    /// Algorithm is not an accepted HMAC variant, or the token is unsigned
    UnsupportedType,
    /// Token string empty, or identity claims missing/unusable
    ClaimsEmpty,
    /// Signature does not verify against the configured secret
    InvalidSignature,
}

impl std::fmt::Display for TokenError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TokenError::Malformed => write!(f, "JWT token is malformed"),
            TokenError::Expired => write!(f, "JWT token is expired"),
            TokenError::UnsupportedType => write!(f, "JWT token is unsupported"),
            TokenError::ClaimsEmpty => write!(f, "JWT claims are empty"),
            TokenError::InvalidSignature => write!(f, "JWT signature does not match"),
        }
    }
}

impl std::error::Error for TokenError {}

impl From<&jsonwebtoken::errors::Error> for TokenError {
    fn from(e: &jsonwebtoken::errors::Error) -> Self {
        match e.kind() {
            ErrorKind::ExpiredSignature => TokenError::Expired,
            ErrorKind::InvalidSignature => TokenError::InvalidSignature,
            ErrorKind::InvalidAlgorithm | ErrorKind::InvalidAlgorithmName => {
                TokenError::UnsupportedType
            }
            ErrorKind::MissingRequiredClaim(_) => TokenError::ClaimsEmpty,
            _ => TokenError::Malformed,
        }
    }
}

/// Verifies (and, for tooling and tests, signs) HMAC access tokens.
#[derive(Clone)]
pub struct TokenValidator {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
}

impl std::fmt::Debug for TokenValidator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenValidator")
            .field("algorithms", &self.validation.algorithms)
            .finish_non_exhaustive()
    }
}

impl TokenValidator {
    /// Create a validator from raw secret bytes.
    pub fn new(secret: &[u8]) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.algorithms = vec![Algorithm::HS256, Algorithm::HS384, Algorithm::HS512];
        validation.leeway = 0;

        Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            validation,
        }
    }

    /// Validate a token and return its identity claims.
    pub fn validate(&self, token: &str) -> Result<Claims, TokenError> {
        if token.trim().is_empty() {
            return Err(TokenError::ClaimsEmpty);
        }

        check_header(token)?;

        let data = jsonwebtoken::decode::<TokenClaims>(token, &self.decoding_key, &self.validation)
            .map_err(|e| {
                let classified = TokenError::from(&e);
                tracing::debug!(error = %e, classification = %classified, "JWT decode failed");
                classified
            })?;

        let TokenClaims {
            user_id, sub, exp, ..
        } = data.claims;

        let user_id = user_id.filter(|v| is_usable_identity(v));
        let email = sub.filter(|v| is_usable_identity(v));
        match (user_id, email) {
            (Some(user_id), Some(email)) => Ok(Claims {
                user_id,
                email,
                expiry: exp,
            }),
            _ => Err(TokenError::ClaimsEmpty),
        }
    }

    /// Sign an access token for `user_id`/`email` valid for `ttl_secs`.
    pub fn issue(&self, user_id: &str, email: &str, ttl_secs: u64) -> Result<String, TokenError> {
        let now = unix_now();
        self.sign(&TokenClaims {
            user_id: Some(user_id.to_string()),
            sub: Some(email.to_string()),
            iat: Some(now),
            exp: now + ttl_secs,
        })
    }

    /// Sign arbitrary claims with HS256.
    pub fn sign(&self, claims: &TokenClaims) -> Result<String, TokenError> {
        jsonwebtoken::encode(&Header::new(Algorithm::HS256), claims, &self.encoding_key)
            .map_err(|e| TokenError::from(&e))
    }
}

/// Header fields needed to tell an unsigned token from a broken one.
#[derive(Deserialize)]
struct RawHeader {
    #[serde(default)]
    alg: Option<String>,
}

/// Headers jsonwebtoken cannot parse are either structurally broken
/// (`Malformed`) or declare no usable algorithm, e.g. `"alg":"none"`
/// (`UnsupportedType`).
fn check_header(token: &str) -> Result<(), TokenError> {
    if jsonwebtoken::decode_header(token).is_ok() {
        return Ok(());
    }

    let segment = token.split('.').next().unwrap_or_default();
    let header: RawHeader = URL_SAFE_NO_PAD
        .decode(segment)
        .ok()
        .and_then(|bytes| serde_json::from_slice(&bytes).ok())
        .ok_or(TokenError::Malformed)?;

    match header.alg {
        Some(alg) if alg.parse::<Algorithm>().is_ok() => Err(TokenError::Malformed),
        _ => Err(TokenError::UnsupportedType),
    }
}

/// Identity values end up in request headers, so they must be non-empty and
/// representable as a header value.
fn is_usable_identity(value: &str) -> bool {
    !value.trim().is_empty() && HeaderValue::from_str(value).is_ok()
}

pub(crate) fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}
