//! CLI argument parsing, validation, and startup helpers.

use std::time::Duration;

use axum::http::HeaderName;
use base64::Engine;
use clap::Parser;
use tracing::{error, warn};
use url::Url;

use crate::GatewayConfig;
use crate::auth::{DEFAULT_REFRESH_COOKIE, DEFAULT_REFRESH_HEADER, RefreshCarrier};
use crate::refresh::DEFAULT_REFRESH_PATH;
use crate::routes::{DEFAULT_OPEN_PATHS, OpenRoutes, RouteMatch};

/// Minimum decoded secret length (HS256 wants at least 256 bits).
const MIN_JWT_SECRET_BYTES: usize = 32;

#[derive(clap::ValueEnum, Clone, Debug, Default)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
    Compact,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum RefreshCarrierKind {
    /// Dedicated request header (see --refresh-header)
    #[default]
    Header,
    /// Cookie (see --refresh-cookie)
    Cookie,
}

fn default_open_paths() -> Vec<String> {
    DEFAULT_OPEN_PATHS.iter().map(|p| p.to_string()).collect()
}

#[derive(Parser, Debug, Clone)]
#[command(
    name = "portcullis",
    about = "Authorizing gateway: validates bearer tokens and forwards with identity headers"
)]
pub struct Args {
    /// Port to listen on
    #[arg(short, long, env = "GATEWAY_PORT", default_value = "8080")]
    pub port: u16,

    /// Base URL that authorized requests are forwarded to (e.g. "http://backend:8081")
    #[arg(long, env = "GATEWAY_UPSTREAM")]
    pub upstream: String,

    /// Base URL of the authorization service (e.g. "http://authorization-server:9000")
    #[arg(long, env = "GATEWAY_AUTH_SERVICE")]
    pub auth_service: String,

    /// Path of the refresh endpoint on the authorization service
    #[arg(long, default_value = DEFAULT_REFRESH_PATH)]
    pub refresh_path: String,

    /// Path to file containing the base64 JWT secret. Prefer using JWT_SECRET env var instead
    #[arg(long)]
    pub jwt_secret_file: Option<String>,

    /// Path fragment exempt from authorization. Repeat or comma-separate to set several
    #[arg(
        long = "open-path",
        env = "GATEWAY_OPEN_PATHS",
        value_delimiter = ',',
        default_values_t = default_open_paths()
    )]
    pub open_paths: Vec<String>,

    /// How open-path fragments are matched against request paths
    #[arg(long, value_enum, default_value = "contains")]
    pub route_match: RouteMatch,

    /// Where the refresh token is carried
    #[arg(long, value_enum, default_value = "header")]
    pub refresh_carrier: RefreshCarrierKind,

    /// Header name carrying the refresh token
    #[arg(long, default_value = DEFAULT_REFRESH_HEADER)]
    pub refresh_header: String,

    /// Cookie name carrying the refresh token
    #[arg(long, default_value = DEFAULT_REFRESH_COOKIE)]
    pub refresh_cookie: String,

    /// Timeout for one refresh call, in milliseconds
    #[arg(long, default_value = "5000")]
    pub refresh_timeout_ms: u64,

    /// Share one refresh call between concurrent requests with the same refresh token
    #[arg(long)]
    pub coalesce_refresh: bool,

    /// Log output format
    #[arg(short, long, default_value = "pretty")]
    pub log_format: LogFormat,
}

/// Initialize logging based on the specified format.
pub fn init_logging(format: &LogFormat) {
    match format {
        LogFormat::Pretty => tracing_subscriber::fmt::init(),
        LogFormat::Json => tracing_subscriber::fmt().json().init(),
        LogFormat::Compact => tracing_subscriber::fmt().compact().init(),
    }
}

/// Load the JWT secret from the environment variable or a file and decode it.
/// Returns None and logs an error if the secret cannot be loaded.
///
/// Must run before any other thread is spawned: it removes `JWT_SECRET`
/// from the process environment.
pub fn load_jwt_secret(jwt_secret_file: Option<&str>) -> Option<Vec<u8>> {
    let encoded = if let Ok(secret) = std::env::var("JWT_SECRET") {
        // Clear the environment variable to prevent leaking
        // SAFETY: only called from the synchronous `main` before the tokio
        // runtime is built, so no other thread exists to read the environment.
        unsafe { std::env::remove_var("JWT_SECRET") };
        secret
    } else if let Some(path) = jwt_secret_file {
        match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) => {
                error!(path = %path, error = %e, "Failed to read JWT secret file");
                return None;
            }
        }
    } else {
        error!(
            "JWT secret is required. Set JWT_SECRET environment variable (recommended) or use --jwt-secret-file"
        );
        return None;
    };

    decode_jwt_secret(encoded.trim())
}

/// Decode a base64 secret and enforce the minimum key length.
pub fn decode_jwt_secret(encoded: &str) -> Option<Vec<u8>> {
    let secret = match base64::engine::general_purpose::STANDARD.decode(encoded) {
        Ok(secret) => secret,
        Err(e) => {
            error!(error = %e, "JWT secret must be base64-encoded");
            return None;
        }
    };

    if secret.len() < MIN_JWT_SECRET_BYTES {
        error!(
            "JWT secret decodes to fewer than {} bytes. Use a longer secret",
            MIN_JWT_SECRET_BYTES
        );
        return None;
    }

    Some(secret)
}

/// Parse a service base URL. Only http(s) is accepted.
/// Returns None and logs an error if validation fails.
pub fn validate_service_url(flag: &str, value: &str) -> Option<Url> {
    let url = match Url::parse(value) {
        Ok(url) => url,
        Err(e) => {
            error!(flag, url = %value, error = %e, "Invalid URL");
            return None;
        }
    };

    if !matches!(url.scheme(), "http" | "https") {
        error!(flag, url = %value, "URL must use http or https");
        return None;
    }

    Some(url)
}

/// Build the refresh endpoint by appending `path` to the service base URL.
pub fn refresh_endpoint(auth_service: &Url, path: &str) -> Option<Url> {
    let path = if path.starts_with('/') {
        path.to_string()
    } else {
        format!("/{}", path)
    };
    let joined = format!("{}{}", auth_service.as_str().trim_end_matches('/'), path);

    match Url::parse(&joined) {
        Ok(url) => Some(url),
        Err(e) => {
            error!(url = %joined, error = %e, "Invalid refresh endpoint");
            None
        }
    }
}

fn refresh_carrier(args: &Args) -> Option<RefreshCarrier> {
    match args.refresh_carrier {
        RefreshCarrierKind::Header => match HeaderName::from_bytes(args.refresh_header.as_bytes())
        {
            Ok(name) => Some(RefreshCarrier::Header(name)),
            Err(e) => {
                error!(header = %args.refresh_header, error = %e, "Invalid refresh header name");
                None
            }
        },
        RefreshCarrierKind::Cookie if args.refresh_cookie.trim().is_empty() => {
            error!("Refresh cookie name must not be empty");
            None
        }
        RefreshCarrierKind::Cookie => Some(RefreshCarrier::Cookie(args.refresh_cookie.clone())),
    }
}

/// Build GatewayConfig from validated arguments.
/// Returns None and logs an error if any argument is invalid.
pub fn build_config(args: &Args, jwt_secret: Vec<u8>) -> Option<GatewayConfig> {
    let upstream = validate_service_url("upstream", &args.upstream)?;
    let auth_service = validate_service_url("auth-service", &args.auth_service)?;
    let refresh_endpoint = refresh_endpoint(&auth_service, &args.refresh_path)?;
    let refresh_carrier = refresh_carrier(args)?;

    if args.refresh_timeout_ms == 0 {
        error!("Refresh timeout must be greater than zero");
        return None;
    }

    let open_routes = OpenRoutes::new(
        args.open_paths.iter().map(|p| p.trim().to_string()),
        args.route_match,
    );
    if open_routes.mode() == RouteMatch::Contains {
        warn!("Open paths use substring matching; any path containing a fragment is exempt");
    }

    Some(GatewayConfig {
        upstream,
        refresh_endpoint,
        jwt_secret,
        open_routes,
        refresh_carrier,
        refresh_timeout: Duration::from_millis(args.refresh_timeout_ms),
        coalesce_refresh: args.coalesce_refresh,
    })
}
