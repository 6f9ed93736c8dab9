//! Per-request authorization decision and its application to the request.

use axum::extract::Request;
use axum::http::{HeaderMap, HeaderName, HeaderValue, header};

use super::errors::{AuthFailure, Reject};
use super::extract::BEARER_PREFIX;
use crate::jwt::Claims;

/// Header carrying the validated user id to downstream services.
pub const USER_ID_HEADER: HeaderName = HeaderName::from_static("x-user-id");

/// Header carrying the validated user email to downstream services.
pub const USER_EMAIL_HEADER: HeaderName = HeaderName::from_static("x-user-email");

/// Response header handing a refreshed access token back to the caller.
pub const REFRESHED_TOKEN_HEADER: HeaderName =
    HeaderName::from_static("x-refreshed-access-token");

/// Identity taken from a token validated during this request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub user_id: String,
    pub email: String,
}

impl From<Claims> for Identity {
    fn from(claims: Claims) -> Self {
        Self {
            user_id: claims.user_id,
            email: claims.email,
        }
    }
}

#[derive(Debug)]
pub enum AuthorizationOutcome {
    /// Open route, forwarded as-is.
    Forward,
    ForwardWithIdentity(Identity),
    ForwardWithRefreshedIdentity {
        access_token: String,
        identity: Identity,
    },
    Reject(AuthFailure),
}

impl AuthorizationOutcome {
    /// Consume the inbound request and produce the one to forward.
    ///
    /// Identity headers sent by the client are always dropped; only values
    /// from a token validated in this request are set.
    pub fn apply(self, request: Request) -> Result<Request, Reject> {
        let (mut parts, body) = request.into_parts();
        parts.headers = match self {
            Self::Forward => without_identity(parts.headers),
            Self::ForwardWithIdentity(identity) => {
                with_identity(without_identity(parts.headers), &identity, None)?
            }
            Self::ForwardWithRefreshedIdentity {
                access_token,
                identity,
            } => with_identity(
                without_identity(parts.headers),
                &identity,
                Some(&access_token),
            )?,
            Self::Reject(reason) => return Err(Reject::new(reason)),
        };
        Ok(Request::from_parts(parts, body))
    }
}

fn without_identity(mut headers: HeaderMap) -> HeaderMap {
    headers.remove(USER_ID_HEADER);
    headers.remove(USER_EMAIL_HEADER);
    headers
}

fn with_identity(
    mut headers: HeaderMap,
    identity: &Identity,
    access_token: Option<&str>,
) -> Result<HeaderMap, Reject> {
    let invalid = |_| Reject::new(AuthFailure::ClaimsEmpty);

    headers.insert(USER_ID_HEADER, HeaderValue::from_str(&identity.user_id).map_err(invalid)?);
    headers.insert(USER_EMAIL_HEADER, HeaderValue::from_str(&identity.email).map_err(invalid)?);

    if let Some(token) = access_token {
        let value = HeaderValue::from_str(&format!("{}{}", BEARER_PREFIX, token))
            .map_err(|_| Reject::new(AuthFailure::RefreshedTokenInvalid))?;
        headers.insert(header::AUTHORIZATION, value);
    }

    Ok(headers)
}
