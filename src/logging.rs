//! Request/response logging stage, ordered before authorization.

use axum::{
    extract::{Request, State},
    http::{HeaderMap, HeaderName, HeaderValue, header},
    middleware::Next,
    response::Response,
};
use std::sync::Arc;
use std::time::Instant;
use tracing::Instrument;
use uuid::Uuid;

use crate::auth::REFRESHED_TOKEN_HEADER;

const REDACTED: &str = "[redacted]";

/// Logs every exchange, hiding credential-bearing headers.
#[derive(Debug, Clone)]
pub struct RequestLogger {
    redacted: Arc<[HeaderName]>,
}

impl RequestLogger {
    /// `extra` lists deployment-specific credential headers (e.g. the refresh header).
    pub fn new(extra: impl IntoIterator<Item = HeaderName>) -> Self {
        let mut redacted = vec![
            header::AUTHORIZATION,
            header::COOKIE,
            header::SET_COOKIE,
            header::PROXY_AUTHORIZATION,
            REFRESHED_TOKEN_HEADER,
        ];
        for name in extra {
            if !redacted.contains(&name) {
                redacted.push(name);
            }
        }
        Self {
            redacted: redacted.into(),
        }
    }

    fn shown<'a>(&self, name: &HeaderName, value: &'a HeaderValue) -> &'a str {
        if self.redacted.contains(name) {
            REDACTED
        } else {
            value.to_str().unwrap_or("[non-ascii]")
        }
    }

    fn log_headers(&self, kind: &'static str, headers: &HeaderMap) {
        if !tracing::enabled!(tracing::Level::DEBUG) {
            return;
        }
        for (name, value) in headers {
            tracing::debug!(header = %name, value = self.shown(name, value), "{}", kind);
        }
    }
}

pub async fn log_exchange(
    State(logger): State<RequestLogger>,
    request: Request,
    next: Next,
) -> Response {
    let request_id = Uuid::new_v4();
    let span = tracing::info_span!(
        "http_request",
        %request_id,
        method = %request.method(),
        uri = %request.uri(),
    );

    async move {
        tracing::info!("Request received");
        logger.log_headers("Request header", request.headers());

        let started = Instant::now();
        let response = next.run(request).await;

        tracing::info!(
            status = response.status().as_u16(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Response sent"
        );
        logger.log_headers("Response header", response.headers());
        response
    }
    .instrument(span)
    .await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_credentials_redacted() {
        let logger = RequestLogger::new([HeaderName::from_static("x-refresh-token")]);
        let secret = HeaderValue::from_static("secret");

        assert_eq!(logger.shown(&header::AUTHORIZATION, &secret), REDACTED);
        assert_eq!(logger.shown(&header::COOKIE, &secret), REDACTED);
        assert_eq!(
            logger.shown(&HeaderName::from_static("x-refresh-token"), &secret),
            REDACTED
        );
        assert_eq!(logger.shown(&header::ACCEPT, &secret), "secret");
    }

    #[test]
    fn test_duplicate_extra_header_not_repeated() {
        let logger = RequestLogger::new([header::COOKIE]);
        assert_eq!(
            logger.redacted.iter().filter(|n| **n == header::COOKIE).count(),
            1
        );
    }
}
