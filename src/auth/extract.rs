//! Access and refresh token extraction from request headers.

use axum::http::{HeaderMap, HeaderName, header};

/// Literal scheme prefix required on the `Authorization` header.
pub const BEARER_PREFIX: &str = "Bearer ";

/// Default header carrying the refresh token.
pub const DEFAULT_REFRESH_HEADER: &str = "x-refresh-token";

/// Default cookie carrying the refresh token.
pub const DEFAULT_REFRESH_COOKIE: &str = "refreshToken";

/// Where the refresh token travels, depending on deployment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshCarrier {
    Header(HeaderName),
    Cookie(String),
}

impl Default for RefreshCarrier {
    fn default() -> Self {
        Self::Header(HeaderName::from_static(DEFAULT_REFRESH_HEADER))
    }
}

impl RefreshCarrier {
    /// Header that must be redacted when logging requests.
    pub fn sensitive_header(&self) -> HeaderName {
        match self {
            Self::Header(name) => name.clone(),
            Self::Cookie(_) => header::COOKIE,
        }
    }
}

/// Pulls tokens out of headers. Never fails: absence is reported as `None`.
#[derive(Debug, Clone, Default)]
pub struct TokenExtractor {
    refresh: RefreshCarrier,
}

impl TokenExtractor {
    pub fn new(refresh: RefreshCarrier) -> Self {
        Self { refresh }
    }

    /// Token from `Authorization: Bearer <token>`. Any other shape yields `None`.
    pub fn access<'a>(&self, headers: &'a HeaderMap) -> Option<&'a str> {
        headers
            .get(header::AUTHORIZATION)?
            .to_str()
            .ok()?
            .strip_prefix(BEARER_PREFIX)
    }

    /// Refresh token from the configured carrier, untransformed.
    pub fn refresh<'a>(&self, headers: &'a HeaderMap) -> Option<&'a str> {
        let value = match &self.refresh {
            RefreshCarrier::Header(name) => headers.get(name)?.to_str().ok()?,
            RefreshCarrier::Cookie(name) => get_cookie(headers, name)?,
        };
        (!value.is_empty()).then_some(value)
    }
}

/// Extract a cookie value from the Cookie header.
pub fn get_cookie<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|part| part.split_once('='))
        .find(|(key, _)| key.trim() == name)
        .map(|(_, value)| value.trim())
}
