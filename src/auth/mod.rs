//! Gateway request authorization.
//!
//! Each request on a protected path must carry a valid bearer access token.
//! When that token is missing or invalid and a refresh token is present, the
//! gateway exchanges it once with the authorization service and continues
//! with the identity of the new token. Everything else is a uniform 401.

mod authorizer;
mod errors;
mod extract;
mod middleware;
mod outcome;

pub use authorizer::RequestAuthorizer;
pub use errors::{AuthFailure, REJECT_MESSAGE, Reject};
pub use extract::{
    BEARER_PREFIX, DEFAULT_REFRESH_COOKIE, DEFAULT_REFRESH_HEADER, RefreshCarrier,
    TokenExtractor, get_cookie,
};
pub use middleware::authorize_request;
pub use outcome::{
    AuthorizationOutcome, Identity, REFRESHED_TOKEN_HEADER, USER_EMAIL_HEADER, USER_ID_HEADER,
};
