pub mod auth;
pub mod cli;
pub mod forward;
pub mod jwt;
pub mod logging;
pub mod refresh;
pub mod routes;

use auth::{RefreshCarrier, RequestAuthorizer, TokenExtractor, authorize_request};
use axum::{Router, extract::DefaultBodyLimit, middleware};
use forward::{MAX_BODY_BYTES, Upstream, forward};
use jwt::TokenValidator;
use logging::{RequestLogger, log_exchange};
use refresh::{HttpAuthServiceClient, RefreshCoordinator};
use routes::OpenRoutes;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use url::Url;

/// Startup configuration. Built once, read-only afterwards.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Base URL authorized requests are forwarded to
    pub upstream: Url,
    /// Full URL of the authorization service's refresh endpoint
    pub refresh_endpoint: Url,
    /// HMAC secret for access tokens (already base64-decoded)
    pub jwt_secret: Vec<u8>,
    /// Paths that bypass authorization
    pub open_routes: OpenRoutes,
    /// Where the refresh token is read from
    pub refresh_carrier: RefreshCarrier,
    /// Upper bound for one refresh exchange
    pub refresh_timeout: Duration,
    /// Share one refresh call between concurrent identical refreshes
    pub coalesce_refresh: bool,
}

/// Build the gateway: logging → authorization → forwarding.
pub fn create_app(config: &GatewayConfig) -> Result<Router, reqwest::Error> {
    let validator = Arc::new(TokenValidator::new(&config.jwt_secret));

    let auth_service = Arc::new(HttpAuthServiceClient::new(
        config.refresh_endpoint.clone(),
        config.refresh_timeout,
    )?);
    let mut refresher =
        RefreshCoordinator::new(auth_service, validator.clone(), config.refresh_timeout);
    if config.coalesce_refresh {
        refresher = refresher.with_coalescing();
    }

    let authorizer = Arc::new(RequestAuthorizer::new(
        config.open_routes.clone(),
        TokenExtractor::new(config.refresh_carrier.clone()),
        validator,
        refresher,
    ));
    let logger = RequestLogger::new([config.refresh_carrier.sensitive_header()]);
    let upstream = Arc::new(Upstream::new(config.upstream.clone())?);

    // ServiceBuilder runs layers top to bottom: logging sees every request,
    // including the ones authorization rejects.
    Ok(Router::new().fallback(forward).with_state(upstream).layer(
        ServiceBuilder::new()
            .layer(middleware::from_fn_with_state(logger, log_exchange))
            .layer(middleware::from_fn_with_state(authorizer, authorize_request))
            .layer(DefaultBodyLimit::max(MAX_BODY_BYTES)),
    ))
}

/// Run the gateway on the given listener until the server exits.
pub async fn run_server(config: GatewayConfig, listener: TcpListener) -> std::io::Result<()> {
    let app = create_app(&config).map_err(std::io::Error::other)?;
    axum::serve(listener, app).await
}

/// Start the gateway on `127.0.0.1:<port>` in a background task. Use port 0
/// to let the OS choose. Returns the address actually bound.
pub async fn start_server(
    config: GatewayConfig,
    port: u16,
) -> std::io::Result<(tokio::task::JoinHandle<()>, SocketAddr)> {
    let listener = TcpListener::bind(("127.0.0.1", port)).await?;
    let local_addr = listener.local_addr()?;

    let handle = tokio::spawn(async move {
        if let Err(e) = run_server(config, listener).await {
            tracing::error!(error = %e, "Server error");
        }
    });

    Ok((handle, local_addr))
}
