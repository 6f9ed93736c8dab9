//! Authorization failure taxonomy and the uniform rejection response.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;

use crate::jwt::TokenError;
use crate::refresh::RefreshError;

/// Message returned to the caller for every rejection.
pub const REJECT_MESSAGE: &str = "Authorization header is missing or invalid";

/// Why a request was rejected. Only ever logged, never sent to the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthFailure {
    AccessTokenMissing,
    AccessTokenMalformed,
    AccessTokenExpired,
    AccessTokenUnsupported,
    AccessTokenSignatureInvalid,
    ClaimsEmpty,
    RefreshTokenMissing,
    RefreshRejectedByService,
    RefreshNetworkError,
    RefreshedTokenInvalid,
}

impl std::fmt::Display for AuthFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::AccessTokenMissing => "access token missing",
            Self::AccessTokenMalformed => "access token malformed",
            Self::AccessTokenExpired => "access token expired",
            Self::AccessTokenUnsupported => "access token unsupported",
            Self::AccessTokenSignatureInvalid => "access token signature invalid",
            Self::ClaimsEmpty => "token claims empty",
            Self::RefreshTokenMissing => "refresh token missing",
            Self::RefreshRejectedByService => "refresh rejected by authorization service",
            Self::RefreshNetworkError => "refresh call failed",
            Self::RefreshedTokenInvalid => "refreshed access token invalid",
        };
        f.write_str(s)
    }
}

impl From<&TokenError> for AuthFailure {
    fn from(e: &TokenError) -> Self {
        match e {
            TokenError::Malformed => Self::AccessTokenMalformed,
            TokenError::Expired => Self::AccessTokenExpired,
            TokenError::UnsupportedType => Self::AccessTokenUnsupported,
            TokenError::ClaimsEmpty => Self::ClaimsEmpty,
            TokenError::InvalidSignature => Self::AccessTokenSignatureInvalid,
        }
    }
}

impl From<&RefreshError> for AuthFailure {
    fn from(e: &RefreshError) -> Self {
        match e {
            RefreshError::Rejected(_) => Self::RefreshRejectedByService,
            RefreshError::Network(_) | RefreshError::Timeout | RefreshError::InvalidBody(_) => {
                Self::RefreshNetworkError
            }
            RefreshError::InvalidToken(_) => Self::RefreshedTokenInvalid,
        }
    }
}

/// Terminal rejection: always 401 with `{"error": REJECT_MESSAGE}`.
#[derive(Debug)]
pub struct Reject {
    pub reason: AuthFailure,
}

impl Reject {
    pub fn new(reason: AuthFailure) -> Self {
        Self { reason }
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: &'static str,
}

impl IntoResponse for Reject {
    fn into_response(self) -> Response {
        tracing::info!(reason = %self.reason, "Request rejected");

        (
            StatusCode::UNAUTHORIZED,
            Json(ErrorResponse {
                error: REJECT_MESSAGE,
            }),
        )
            .into_response()
    }
}
