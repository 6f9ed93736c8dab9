//! Refresh-token exchange against the external authorization service.
//!
//! One `POST` per exchange, bounded by a timeout, no retries. Optionally,
//! concurrent exchanges for the same refresh token share a single call.

use async_trait::async_trait;
use futures::future::{BoxFuture, FutureExt, WeakShared};
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use url::Url;

use crate::jwt::{Claims, TokenError, TokenValidator};

/// Path of the refresh endpoint on the authorization service.
pub const DEFAULT_REFRESH_PATH: &str = "/auth/refresh";

/// Upper bound on a single refresh exchange.
pub const DEFAULT_REFRESH_TIMEOUT: Duration = Duration::from_secs(5);

/// Errors that can occur while refreshing an access token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshError {
    /// Service answered with a non-2xx status
    Rejected(u16),
    /// Connection or transport failure
    Network(String),
    /// No answer within the configured timeout
    Timeout,
    /// 2xx answer without a usable `accessToken`
    InvalidBody(String),
    /// The returned access token did not validate
    InvalidToken(TokenError),
}

impl std::fmt::Display for RefreshError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RefreshError::Rejected(status) => {
                write!(f, "Authorization service rejected refresh: HTTP {}", status)
            }
            RefreshError::Network(e) => write!(f, "Refresh request failed: {}", e),
            RefreshError::Timeout => write!(f, "Refresh request timed out"),
            RefreshError::InvalidBody(e) => write!(f, "Invalid refresh response: {}", e),
            RefreshError::InvalidToken(e) => write!(f, "Refreshed token invalid: {}", e),
        }
    }
}

impl std::error::Error for RefreshError {}

/// Exchanges a refresh token for a new (unvalidated) access token.
#[async_trait]
pub trait AuthServiceClient: Send + Sync {
    async fn exchange(&self, refresh_token: &str) -> Result<String, RefreshError>;
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RefreshResponse {
    #[serde(default)]
    access_token: Option<String>,
}

/// `AuthServiceClient` speaking HTTP to the authorization service.
#[derive(Debug, Clone)]
pub struct HttpAuthServiceClient {
    http: reqwest::Client,
    endpoint: Url,
}

impl HttpAuthServiceClient {
    pub fn new(endpoint: Url, timeout: Duration) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { http, endpoint })
    }
}

fn transport_error(e: reqwest::Error) -> RefreshError {
    if e.is_timeout() {
        RefreshError::Timeout
    } else {
        RefreshError::Network(e.to_string())
    }
}

#[async_trait]
impl AuthServiceClient for HttpAuthServiceClient {
    async fn exchange(&self, refresh_token: &str) -> Result<String, RefreshError> {
        let response = self
            .http
            .post(self.endpoint.clone())
            .bearer_auth(refresh_token)
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        if !status.is_success() {
            return Err(RefreshError::Rejected(status.as_u16()));
        }

        let body = response.bytes().await.map_err(transport_error)?;
        let parsed: RefreshResponse = serde_json::from_slice(&body)
            .map_err(|e| RefreshError::InvalidBody(e.to_string()))?;

        parsed
            .access_token
            .filter(|token| !token.is_empty())
            .ok_or_else(|| RefreshError::InvalidBody("missing accessToken".to_string()))
    }
}

/// A successfully refreshed and validated access token.
#[derive(Debug, Clone)]
pub struct RefreshedIdentity {
    pub access_token: String,
    pub claims: Claims,
}

type ExchangeFuture = BoxFuture<'static, Result<String, RefreshError>>;
type InFlightMap = Mutex<HashMap<String, InFlightEntry>>;

/// Map entry for a shared exchange. Only waiters hold the call strongly, so
/// the exchange is dropped once the last of them goes away.
struct InFlightEntry {
    id: u64,
    call: WeakShared<ExchangeFuture>,
}

/// Runs the refresh exchange and validates the token it returns.
pub struct RefreshCoordinator {
    client: Arc<dyn AuthServiceClient>,
    validator: Arc<TokenValidator>,
    timeout: Duration,
    in_flight: Option<Arc<InFlightMap>>,
    next_call_id: AtomicU64,
}

impl RefreshCoordinator {
    pub fn new(
        client: Arc<dyn AuthServiceClient>,
        validator: Arc<TokenValidator>,
        timeout: Duration,
    ) -> Self {
        Self {
            client,
            validator,
            timeout,
            in_flight: None,
            next_call_id: AtomicU64::new(0),
        }
    }

    /// Share one outbound call between concurrent refreshes of the same token.
    pub fn with_coalescing(mut self) -> Self {
        self.in_flight = Some(Arc::default());
        self
    }

    pub async fn refresh(&self, refresh_token: &str) -> Result<RefreshedIdentity, RefreshError> {
        let access_token = match &self.in_flight {
            Some(in_flight) => self.exchange_shared(in_flight, refresh_token).await?,
            None => exchange_with_timeout(self.client.as_ref(), refresh_token, self.timeout).await?,
        };

        let claims = self
            .validator
            .validate(&access_token)
            .map_err(RefreshError::InvalidToken)?;

        Ok(RefreshedIdentity {
            access_token,
            claims,
        })
    }

    async fn exchange_shared(
        &self,
        in_flight: &Arc<InFlightMap>,
        refresh_token: &str,
    ) -> Result<String, RefreshError> {
        let call = {
            let mut calls = in_flight.lock().unwrap_or_else(PoisonError::into_inner);
            match calls.get(refresh_token).and_then(|entry| entry.call.upgrade()) {
                Some(call) => call,
                None => {
                    let id = self.next_call_id.fetch_add(1, Ordering::Relaxed);
                    let guard = InFlightGuard {
                        in_flight: in_flight.clone(),
                        key: refresh_token.to_string(),
                        id,
                    };
                    let client = self.client.clone();
                    let token = refresh_token.to_string();
                    let timeout = self.timeout;
                    let call = async move {
                        let _guard = guard;
                        exchange_with_timeout(client.as_ref(), &token, timeout).await
                    }
                    .boxed()
                    .shared();

                    if let Some(weak) = call.downgrade() {
                        calls.insert(refresh_token.to_string(), InFlightEntry { id, call: weak });
                    }
                    call
                }
            }
        };

        call.await
    }

    #[cfg(test)]
    fn in_flight_len(&self) -> usize {
        self.in_flight.as_ref().map_or(0, |m| {
            m.lock().unwrap_or_else(PoisonError::into_inner).len()
        })
    }
}

/// Owned by the shared exchange itself. Dropped when the exchange completes
/// or when every waiter has gone, and removes its own map entry.
struct InFlightGuard {
    in_flight: Arc<InFlightMap>,
    key: String,
    id: u64,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        let mut calls = self.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
        if calls.get(&self.key).is_some_and(|entry| entry.id == self.id) {
            calls.remove(&self.key);
        }
    }
}

async fn exchange_with_timeout(
    client: &dyn AuthServiceClient,
    refresh_token: &str,
    timeout: Duration,
) -> Result<String, RefreshError> {
    tokio::time::timeout(timeout, client.exchange(refresh_token))
        .await
        .map_err(|_| RefreshError::Timeout)?
}
