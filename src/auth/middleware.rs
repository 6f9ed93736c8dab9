//! Axum middleware running the authorizer in front of the forwarder.

use axum::{
    extract::{Request, State},
    http::HeaderValue,
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::sync::Arc;

use super::authorizer::RequestAuthorizer;
use super::outcome::{AuthorizationOutcome, REFRESHED_TOKEN_HEADER};

/// Authorize the request, then forward it or answer 401.
///
/// On a refresh, the new access token is also returned to the caller in
/// `X-Refreshed-Access-Token`.
pub async fn authorize_request(
    State(authorizer): State<Arc<RequestAuthorizer>>,
    request: Request,
    next: Next,
) -> Response {
    // Hold the body by value across the await; only the parts are borrowed.
    let (parts, body) = request.into_parts();
    let outcome = authorizer.authorize(parts.uri.path(), &parts.headers).await;

    let refreshed_token = match &outcome {
        AuthorizationOutcome::ForwardWithRefreshedIdentity { access_token, .. } => {
            HeaderValue::from_str(access_token).ok()
        }
        _ => None,
    };

    let request = match outcome.apply(Request::from_parts(parts, body)) {
        Ok(request) => request,
        Err(reject) => return reject.into_response(),
    };

    let mut response = next.run(request).await;
    if let Some(token) = refreshed_token {
        response.headers_mut().insert(REFRESHED_TOKEN_HEADER, token);
    }
    response
}
