#![allow(dead_code)]

use axum::{
    Json, Router,
    body::{Body, to_bytes},
    extract::{Request, State},
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Response},
    routing::post,
};
use portcullis::auth::RefreshCarrier;
use portcullis::jwt::{TokenClaims, TokenValidator};
use portcullis::routes::{DEFAULT_OPEN_PATHS, OpenRoutes, RouteMatch};
use portcullis::{GatewayConfig, create_app};
use serde_json::{Value, json};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::TcpListener;
use tower::ServiceExt;
use url::Url;

/// Secret shared by the gateway and the fake authorization service.
pub const SECRET: [u8; 32] = [42; 32];

/// How the fake authorization service answers `POST /auth/refresh`.
#[derive(Debug, Clone)]
pub enum AuthBehavior {
    /// Issue a fresh access token for this identity
    Issue {
        user_id: &'static str,
        email: &'static str,
    },
    /// Answer with this status and a plain-text body
    Status(StatusCode),
    /// Answer 200 with this raw JSON body
    Body(String),
    /// Wait, then issue a token for `u-slow`
    Delay(Duration),
}

pub struct AuthService {
    pub addr: SocketAddr,
    behavior: AuthBehavior,
    tokens: TokenValidator,
    calls: AtomicUsize,
    last_authorization: Mutex<Option<String>>,
}

impl AuthService {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_authorization(&self) -> Option<String> {
        self.last_authorization.lock().unwrap().clone()
    }

    pub fn refresh_url(&self) -> Url {
        Url::parse(&format!("http://{}/auth/refresh", self.addr)).unwrap()
    }

    fn issue(&self, user_id: &str, email: &str) -> Response {
        let token = self.tokens.issue(user_id, email, 900).unwrap();
        Json(json!({ "accessToken": token, "tokenType": "Bearer" })).into_response()
    }
}

async fn refresh_handler(State(service): State<Arc<AuthService>>, headers: HeaderMap) -> Response {
    service.calls.fetch_add(1, Ordering::SeqCst);
    *service.last_authorization.lock().unwrap() = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .map(String::from);

    match &service.behavior {
        AuthBehavior::Issue { user_id, email } => service.issue(user_id, email),
        AuthBehavior::Status(status) => (*status, "refresh store unavailable").into_response(),
        AuthBehavior::Body(body) => (
            [(header::CONTENT_TYPE, "application/json")],
            body.clone(),
        )
            .into_response(),
        AuthBehavior::Delay(delay) => {
            tokio::time::sleep(*delay).await;
            service.issue("u-slow", "slow@example.com")
        }
    }
}

async fn serve(app: Router) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

/// Start a fake authorization service on a random local port.
pub async fn spawn_auth_service(behavior: AuthBehavior) -> Arc<AuthService> {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let service = Arc::new(AuthService {
        addr: listener.local_addr().unwrap(),
        behavior,
        tokens: TokenValidator::new(&SECRET),
        calls: AtomicUsize::new(0),
        last_authorization: Mutex::new(None),
    });

    let app = Router::new()
        .route("/auth/refresh", post(refresh_handler))
        .with_state(service.clone());
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    service
}

/// Upstream that answers every request with what it received.
async fn echo(request: Request) -> Json<Value> {
    let (parts, body) = request.into_parts();
    let body = to_bytes(body, usize::MAX).await.unwrap();
    let headers: serde_json::Map<String, Value> = parts
        .headers
        .iter()
        .map(|(name, value)| {
            (
                name.to_string(),
                Value::String(value.to_str().unwrap_or_default().to_string()),
            )
        })
        .collect();

    Json(json!({
        "method": parts.method.as_str(),
        "uri": parts.uri.to_string(),
        "headers": headers,
        "body": String::from_utf8_lossy(&body),
    }))
}

pub async fn spawn_echo_upstream() -> Url {
    let addr = serve(Router::new().fallback(echo)).await;
    Url::parse(&format!("http://{}", addr)).unwrap()
}

/// An address nothing listens on.
pub async fn dead_upstream() -> Url {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    Url::parse(&format!("http://{}", addr)).unwrap()
}

pub struct TestGateway {
    pub app: Router,
    pub tokens: TokenValidator,
    pub auth: Arc<AuthService>,
}

impl TestGateway {
    pub async fn start(behavior: AuthBehavior) -> Self {
        Self::start_with(behavior, |_| {}).await
    }

    /// Start a gateway in front of an echo upstream. `configure` can adjust
    /// the defaults before the app is built.
    pub async fn start_with(
        behavior: AuthBehavior,
        configure: impl FnOnce(&mut GatewayConfig),
    ) -> Self {
        let auth = spawn_auth_service(behavior).await;
        let mut config = GatewayConfig {
            upstream: spawn_echo_upstream().await,
            refresh_endpoint: auth.refresh_url(),
            jwt_secret: SECRET.to_vec(),
            open_routes: OpenRoutes::new(DEFAULT_OPEN_PATHS.iter().copied(), RouteMatch::Contains),
            refresh_carrier: RefreshCarrier::default(),
            refresh_timeout: Duration::from_secs(5),
            coalesce_refresh: false,
        };
        configure(&mut config);

        Self {
            app: create_app(&config).unwrap(),
            tokens: TokenValidator::new(&SECRET),
            auth,
        }
    }

    pub async fn send(&self, request: Request<Body>) -> Response {
        self.app.clone().oneshot(request).await.unwrap()
    }

    pub fn valid_token(&self, user_id: &str, email: &str) -> String {
        self.tokens.issue(user_id, email, 900).unwrap()
    }

    pub fn expired_token(&self, user_id: &str, email: &str) -> String {
        self.tokens
            .sign(&TokenClaims {
                user_id: Some(user_id.to_string()),
                sub: Some(email.to_string()),
                iat: Some(1_000_000),
                exp: 1_000_900,
            })
            .unwrap()
    }
}

pub async fn json_body(response: Response) -> Value {
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&body).unwrap()
}

/// Header value the echo upstream saw, if any.
pub fn echoed_header<'a>(echo: &'a Value, name: &str) -> Option<&'a str> {
    echo["headers"][name].as_str()
}
