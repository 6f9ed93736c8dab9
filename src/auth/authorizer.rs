//! Request authorization: open route, valid access token, or refresh.

use axum::http::HeaderMap;

use super::errors::AuthFailure;
use super::extract::TokenExtractor;
use super::outcome::AuthorizationOutcome;
use crate::jwt::TokenValidator;
use crate::refresh::RefreshCoordinator;
use crate::routes::OpenRoutes;
use std::sync::Arc;

/// Decides the `AuthorizationOutcome` for each request.
///
/// Holds only startup configuration; shared read-only between requests.
pub struct RequestAuthorizer {
    open_routes: OpenRoutes,
    extractor: TokenExtractor,
    validator: Arc<TokenValidator>,
    refresher: RefreshCoordinator,
}

impl RequestAuthorizer {
    pub fn new(
        open_routes: OpenRoutes,
        extractor: TokenExtractor,
        validator: Arc<TokenValidator>,
        refresher: RefreshCoordinator,
    ) -> Self {
        Self {
            open_routes,
            extractor,
            validator,
            refresher,
        }
    }

    pub async fn authorize(&self, path: &str, headers: &HeaderMap) -> AuthorizationOutcome {
        if !self.open_routes.is_protected(path) {
            tracing::debug!(path, "Open route");
            return AuthorizationOutcome::Forward;
        }

        let access_failure = match self.extractor.access(headers) {
            Some(token) => match self.validator.validate(token) {
                Ok(claims) => return AuthorizationOutcome::ForwardWithIdentity(claims.into()),
                Err(e) => {
                    tracing::warn!(path, error = %e, "Access token validation failed");
                    AuthFailure::from(&e)
                }
            },
            None => AuthFailure::AccessTokenMissing,
        };

        let Some(refresh_token) = self.extractor.refresh(headers) else {
            tracing::debug!(path, access = %access_failure, "No refresh token available");
            return AuthorizationOutcome::Reject(match access_failure {
                AuthFailure::AccessTokenMissing => AuthFailure::RefreshTokenMissing,
                other => other,
            });
        };

        tracing::info!(path, access = %access_failure, "Refreshing access token");
        match self.refresher.refresh(refresh_token).await {
            Ok(refreshed) => {
                tracing::info!(path, user_id = %refreshed.claims.user_id, "Access token refreshed");
                AuthorizationOutcome::ForwardWithRefreshedIdentity {
                    access_token: refreshed.access_token,
                    identity: refreshed.claims.into(),
                }
            }
            Err(e) => {
                tracing::warn!(path, error = %e, "Access token refresh failed");
                AuthorizationOutcome::Reject(AuthFailure::from(&e))
            }
        }
    }
}
