//! Pass-through forwarding to the single upstream service.
//!
//! No route table and no load balancing: every authorized request goes to
//! `<upstream base><original path and query>`.

use axum::{
    Json,
    body::{Body, Bytes},
    extract::{State, rejection::BytesRejection},
    http::{HeaderMap, HeaderName, Method, StatusCode, Uri, header},
    response::{IntoResponse, Response},
};
use serde::Serialize;
use std::sync::Arc;
use url::Url;

/// Largest request body buffered for forwarding. Enforced through
/// `DefaultBodyLimit` in `create_app`.
pub const MAX_BODY_BYTES: usize = 16 * 1024 * 1024;

const HOP_BY_HOP: [HeaderName; 8] = [
    header::CONNECTION,
    HeaderName::from_static("keep-alive"),
    header::PROXY_AUTHENTICATE,
    header::PROXY_AUTHORIZATION,
    header::TE,
    header::TRAILER,
    header::TRANSFER_ENCODING,
    header::UPGRADE,
];

/// HTTP client bound to the upstream base URL.
#[derive(Debug, Clone)]
pub struct Upstream {
    client: reqwest::Client,
    base: Url,
}

impl Upstream {
    pub fn new(base: Url) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .build()?;
        Ok(Self { client, base })
    }

    fn target(&self, path_and_query: &str) -> String {
        format!("{}{}", self.base.as_str().trim_end_matches('/'), path_and_query)
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: &'static str,
}

fn error_response(status: StatusCode, error: &'static str) -> Response {
    (status, Json(ErrorResponse { error })).into_response()
}

fn without_hop_by_hop(mut headers: HeaderMap) -> HeaderMap {
    for name in HOP_BY_HOP {
        headers.remove(name);
    }
    headers
}

/// Fallback handler: send the request upstream and relay the answer.
pub async fn forward(
    State(upstream): State<Arc<Upstream>>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Result<Bytes, BytesRejection>,
) -> Response {
    let target = upstream.target(uri.path_and_query().map(|pq| pq.as_str()).unwrap_or("/"));

    let body = match body {
        Ok(bytes) => bytes,
        Err(rejection) if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE => {
            tracing::warn!(limit = MAX_BODY_BYTES, "Request body too large");
            return error_response(StatusCode::PAYLOAD_TOO_LARGE, "Request body too large");
        }
        Err(rejection) => {
            tracing::warn!(error = %rejection.body_text(), "Failed to read request body");
            return error_response(StatusCode::BAD_REQUEST, "Invalid request body");
        }
    };

    let mut headers = without_hop_by_hop(headers);
    headers.remove(header::HOST);
    headers.remove(header::CONTENT_LENGTH);

    let result = upstream
        .client
        .request(method, target.as_str())
        .headers(headers)
        .body(body)
        .send()
        .await;

    match result {
        Ok(upstream_response) => {
            let status = upstream_response.status();
            let headers = without_hop_by_hop(upstream_response.headers().clone());

            let mut response = Response::new(Body::from_stream(upstream_response.bytes_stream()));
            *response.status_mut() = status;
            *response.headers_mut() = headers;
            response
        }
        Err(e) => {
            tracing::error!(target = %target, error = %e, "Upstream request failed");
            error_response(StatusCode::BAD_GATEWAY, "Upstream unavailable")
        }
    }
}
