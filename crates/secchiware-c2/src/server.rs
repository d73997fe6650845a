// crates/secchiware-c2/src/server.rs
// ============================================================================
// Module: C2 HTTP Server
// Description: Shared state, error envelope, CORS, and the route table.
// Purpose: Wire every C2 handler over one injected state value.
// Dependencies: axum, tokio, secchiware-core, secchiware-bundle
// ============================================================================

//! ## Overview
//! The C2 router spans three surfaces: the environment registry, the master
//! test repository, and the searchable history. All shared dependencies —
//! store, broker, repository, key directories, the node client — are
//! injected through [`ServerState`] at startup; no module-level state
//! exists. Every response, success or error, carries the configured
//! `Access-Control-Allow-Origin` header.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;
use std::time::Duration;

use axum::Json;
use axum::Router;
use axum::extract::Request;
use axum::extract::State;
use axum::http::HeaderValue;
use axum::http::StatusCode;
use axum::http::header::ACCESS_CONTROL_ALLOW_ORIGIN;
use axum::http::header::ORIGIN;
use axum::http::header::WWW_AUTHENTICATE;
use axum::middleware;
use axum::middleware::Next;
use axum::response::IntoResponse;
use axum::response::Response;
use axum::routing::delete;
use axum::routing::get;
use axum::routing::patch;
use axum::routing::post;
use secchiware_bundle::MultipartError;
use secchiware_bundle::RegistryError;
use secchiware_bundle::TestRegistry;
use secchiware_core::CacheBroker;
use secchiware_core::FencingToken;
use secchiware_core::KeyId;
use secchiware_core::SelectorError;
use secchiware_core::SessionStore;
use secchiware_core::StoreError;
use secchiware_core::signing::SCHEME;
use secchiware_core::signing::StaticSecrets;
use secchiware_core::signing::VerifyError;
use serde_json::json;
use thiserror::Error;

use crate::environments;
use crate::history;
use crate::replication;
use crate::replication::NodeClient;
use crate::replication::UpstreamError;
use crate::repository;
use crate::telemetry::C2MetricEvent;
use crate::telemetry::C2Metrics;
use crate::telemetry::C2Operation;
use crate::telemetry::C2Outcome;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Poll interval while waiting on a contended broker mutex.
const LOCK_POLL_INTERVAL: Duration = Duration::from_millis(25);

// ============================================================================
// SECTION: API Errors
// ============================================================================

/// HTTP error carrying the wire envelope.
///
/// # Invariants
/// - 401 responses always carry the scheme challenge header.
/// - 500 responses carry a generic message; details stay server-side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiError {
    /// Response status code.
    status: StatusCode,
    /// Human description placed in the error envelope.
    message: String,
    /// Whether to attach the `WWW-Authenticate` challenge.
    challenge: bool,
}

impl ApiError {
    /// Builds a 400 validation error.
    #[must_use]
    pub fn validation(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
            challenge: false,
        }
    }

    /// Builds a 401 authentication error with challenge.
    #[must_use]
    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::UNAUTHORIZED,
            message: message.into(),
            challenge: true,
        }
    }

    /// Builds a 404 not-found error.
    #[must_use]
    pub fn not_found(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            message: message.into(),
            challenge: false,
        }
    }

    /// Builds a 415 unsupported-media error.
    #[must_use]
    pub fn unsupported_media(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::UNSUPPORTED_MEDIA_TYPE,
            message: message.into(),
            challenge: false,
        }
    }

    /// Builds a 502 bad-gateway error for node protocol violations.
    #[must_use]
    pub fn bad_gateway(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_GATEWAY,
            message: message.into(),
            challenge: false,
        }
    }

    /// Builds a 504 gateway-timeout error for unreachable nodes.
    #[must_use]
    pub fn node_unresponsive(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::GATEWAY_TIMEOUT,
            message: message.into(),
            challenge: false,
        }
    }

    /// Builds a 500 internal error with a generic wire message.
    #[must_use]
    pub fn internal() -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: "internal error".to_string(),
            challenge: false,
        }
    }

    /// Maps a forwarded node status through unchanged.
    #[must_use]
    pub fn passthrough(status: u16, message: impl Into<String>) -> Self {
        StatusCode::from_u16(status).map_or_else(
            |_| Self::bad_gateway("node returned an invalid status"),
            |status| Self {
                status,
                message: message.into(),
                challenge: false,
            },
        )
    }

    /// Returns the response status.
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        self.status
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let mut response = (self.status, Json(json!({ "error": self.message }))).into_response();
        if self.challenge
            && let Ok(value) = SCHEME.parse()
        {
            response.headers_mut().insert(WWW_AUTHENTICATE, value);
        }
        response
    }
}

impl From<VerifyError> for ApiError {
    fn from(error: VerifyError) -> Self {
        if error.is_malformed() {
            Self::validation(error.to_string())
        } else if error.is_internal() {
            Self::internal()
        } else {
            Self::unauthorized(error.to_string())
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(error: StoreError) -> Self {
        match &error {
            StoreError::NotFound(_) => Self::not_found(error.to_string()),
            StoreError::ActiveSession(_) => Self::validation(error.to_string()),
            StoreError::Io(_) | StoreError::Db(_) | StoreError::Invalid(_) => Self::internal(),
        }
    }
}

impl From<RegistryError> for ApiError {
    fn from(error: RegistryError) -> Self {
        match &error {
            RegistryError::UnknownPackage(_) => Self::not_found(error.to_string()),
            RegistryError::Archive(_) | RegistryError::Discovery(_) => {
                Self::validation(error.to_string())
            }
            RegistryError::Io(_) | RegistryError::Lock => Self::internal(),
        }
    }
}

impl From<SelectorError> for ApiError {
    fn from(error: SelectorError) -> Self {
        match error {
            SelectorError::UnknownParameter(_) | SelectorError::InvalidName(_) => {
                Self::validation(error.to_string())
            }
            SelectorError::UnknownName(_) => Self::not_found(error.to_string()),
        }
    }
}

impl From<MultipartError> for ApiError {
    fn from(error: MultipartError) -> Self {
        match &error {
            MultipartError::UnsupportedMediaType(_) => Self::unsupported_media(error.to_string()),
            MultipartError::Malformed(_) | MultipartError::MissingPart(_) => {
                Self::validation(error.to_string())
            }
        }
    }
}

impl From<UpstreamError> for ApiError {
    fn from(error: UpstreamError) -> Self {
        match error {
            UpstreamError::Client(_) => Self::internal(),
            UpstreamError::Unreachable(message) => Self::node_unresponsive(message),
            UpstreamError::Protocol(message) => Self::bad_gateway(message),
            UpstreamError::Status {
                status,
                message,
            } => Self::passthrough(status, message),
        }
    }
}

// ============================================================================
// SECTION: Server State
// ============================================================================

/// Errors produced while assembling server state.
///
/// # Invariants
/// - Variants are stable for programmatic handling.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StateBuildError {
    /// A required dependency was not provided.
    #[error("server state is missing {0}")]
    Missing(&'static str),
}

/// Shared state behind every C2 handler.
///
/// # Invariants
/// - All cross-request coordination flows through the injected broker.
/// - Secret directories are split per role.
pub struct ServerState {
    /// Durable session store.
    pub(crate) store: Arc<dyn SessionStore>,
    /// Shared cache/lock broker.
    pub(crate) broker: Arc<dyn CacheBroker>,
    /// Master test repository.
    pub(crate) repository: TestRegistry,
    /// Accepted client signing secrets.
    pub(crate) client_secrets: StaticSecrets,
    /// Accepted node signing secrets.
    pub(crate) node_secrets: StaticSecrets,
    /// Identity the C2 signs outbound node requests with.
    pub(crate) c2_key_id: KeyId,
    /// Signature freshness window.
    pub(crate) skew: Duration,
    /// Broker mutex lease.
    pub(crate) lock_ttl: Duration,
    /// Broker mutex wait budget.
    pub(crate) lock_wait: Duration,
    /// Outbound client for node requests.
    pub(crate) node_client: NodeClient,
    /// Origins allowed in CORS responses.
    pub(crate) allowed_origins: Vec<String>,
    /// Metrics sink.
    pub(crate) metrics: Arc<dyn C2Metrics>,
}

impl ServerState {
    /// Returns a builder for the server state.
    #[must_use]
    pub fn builder() -> ServerStateBuilder {
        ServerStateBuilder::default()
    }

    /// Returns the master repository.
    #[must_use]
    pub const fn repository(&self) -> &TestRegistry {
        &self.repository
    }

    /// Records an operation outcome.
    pub(crate) fn record(&self, operation: C2Operation, ok: bool) {
        self.metrics.record(C2MetricEvent {
            operation,
            outcome: if ok { C2Outcome::Ok } else { C2Outcome::Error },
        });
    }
}

/// Builder for [`ServerState`].
///
/// # Invariants
/// - `build` succeeds only when every required dependency is present.
#[derive(Default)]
pub struct ServerStateBuilder {
    /// Durable session store.
    store: Option<Arc<dyn SessionStore>>,
    /// Shared cache/lock broker.
    broker: Option<Arc<dyn CacheBroker>>,
    /// Master test repository.
    repository: Option<TestRegistry>,
    /// Accepted client signing secrets.
    client_secrets: Option<StaticSecrets>,
    /// Accepted node signing secrets.
    node_secrets: Option<StaticSecrets>,
    /// Outbound signing identity.
    c2_key_id: Option<KeyId>,
    /// Signature freshness window.
    skew: Option<Duration>,
    /// Broker mutex lease.
    lock_ttl: Option<Duration>,
    /// Broker mutex wait budget.
    lock_wait: Option<Duration>,
    /// Outbound node client.
    node_client: Option<NodeClient>,
    /// CORS origin list.
    allowed_origins: Vec<String>,
    /// Metrics sink.
    metrics: Option<Arc<dyn C2Metrics>>,
}

impl ServerStateBuilder {
    /// Sets the durable session store.
    #[must_use]
    pub fn store(mut self, store: Arc<dyn SessionStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Sets the cache/lock broker.
    #[must_use]
    pub fn broker(mut self, broker: Arc<dyn CacheBroker>) -> Self {
        self.broker = Some(broker);
        self
    }

    /// Sets the master repository.
    #[must_use]
    pub fn repository(mut self, repository: TestRegistry) -> Self {
        self.repository = Some(repository);
        self
    }

    /// Sets the accepted client secrets.
    #[must_use]
    pub fn client_secrets(mut self, secrets: StaticSecrets) -> Self {
        self.client_secrets = Some(secrets);
        self
    }

    /// Sets the accepted node secrets.
    #[must_use]
    pub fn node_secrets(mut self, secrets: StaticSecrets) -> Self {
        self.node_secrets = Some(secrets);
        self
    }

    /// Sets the outbound signing identity.
    #[must_use]
    pub fn c2_key_id(mut self, key_id: KeyId) -> Self {
        self.c2_key_id = Some(key_id);
        self
    }

    /// Sets the signature freshness window.
    #[must_use]
    pub const fn skew(mut self, skew: Duration) -> Self {
        self.skew = Some(skew);
        self
    }

    /// Sets the broker mutex lease and wait budget.
    #[must_use]
    pub const fn locks(mut self, ttl: Duration, wait: Duration) -> Self {
        self.lock_ttl = Some(ttl);
        self.lock_wait = Some(wait);
        self
    }

    /// Sets the outbound node client.
    #[must_use]
    pub fn node_client(mut self, client: NodeClient) -> Self {
        self.node_client = Some(client);
        self
    }

    /// Sets the CORS origin list.
    #[must_use]
    pub fn allowed_origins(mut self, origins: Vec<String>) -> Self {
        self.allowed_origins = origins;
        self
    }

    /// Sets the metrics sink.
    #[must_use]
    pub fn metrics(mut self, metrics: Arc<dyn C2Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Builds the server state.
    ///
    /// # Errors
    ///
    /// Returns [`StateBuildError::Missing`] naming the first absent
    /// dependency.
    pub fn build(self) -> Result<ServerState, StateBuildError> {
        Ok(ServerState {
            store: self.store.ok_or(StateBuildError::Missing("store"))?,
            broker: self.broker.ok_or(StateBuildError::Missing("broker"))?,
            repository: self.repository.ok_or(StateBuildError::Missing("repository"))?,
            client_secrets: self
                .client_secrets
                .ok_or(StateBuildError::Missing("client_secrets"))?,
            node_secrets: self.node_secrets.ok_or(StateBuildError::Missing("node_secrets"))?,
            c2_key_id: self.c2_key_id.ok_or(StateBuildError::Missing("c2_key_id"))?,
            skew: self.skew.ok_or(StateBuildError::Missing("skew"))?,
            lock_ttl: self.lock_ttl.ok_or(StateBuildError::Missing("lock_ttl"))?,
            lock_wait: self.lock_wait.ok_or(StateBuildError::Missing("lock_wait"))?,
            node_client: self.node_client.ok_or(StateBuildError::Missing("node_client"))?,
            allowed_origins: self.allowed_origins,
            metrics: self.metrics.ok_or(StateBuildError::Missing("metrics"))?,
        })
    }
}

// ============================================================================
// SECTION: Broker Mutexes
// ============================================================================

/// Acquires a named broker mutex, waiting up to the configured budget.
///
/// # Errors
///
/// Returns a 500 [`ApiError`] when the budget elapses or the broker fails.
pub(crate) async fn acquire_lock(
    state: &ServerState,
    name: &str,
) -> Result<FencingToken, ApiError> {
    let deadline = tokio::time::Instant::now() + state.lock_wait;
    loop {
        match state.broker.acquire(name, state.lock_ttl) {
            Ok(Some(token)) => return Ok(token),
            Ok(None) => {
                if tokio::time::Instant::now() >= deadline {
                    return Err(ApiError::internal());
                }
                tokio::time::sleep(LOCK_POLL_INTERVAL).await;
            }
            Err(_) => return Err(ApiError::internal()),
        }
    }
}

/// Releases a named broker mutex; release failures are not fatal.
pub(crate) fn release_lock(state: &ServerState, name: &str, token: FencingToken) {
    let _ = state.broker.release(name, token);
}

// ============================================================================
// SECTION: Router
// ============================================================================

/// Builds the C2 router over shared state.
#[must_use]
pub fn build_router(state: Arc<ServerState>) -> Router {
    Router::new()
        .route(
            "/environments",
            post(environments::handle_register).get(environments::handle_list),
        )
        .route("/environments/{ip}/{port}", delete(environments::handle_deregister))
        .route("/environments/{ip}/{port}/installed", patch(replication::handle_replicate))
        .route("/environments/{ip}/{port}/reports", get(replication::handle_proxy_reports))
        .route("/test_sets", get(repository::handle_list).patch(repository::handle_install))
        .route("/test_sets/{package}", delete(repository::handle_remove))
        .route("/sessions", get(history::handle_list_sessions))
        .route(
            "/sessions/{id}",
            get(history::handle_session_detail).delete(history::handle_delete_session),
        )
        .route("/executions", get(history::handle_list_executions))
        .layer(middleware::from_fn_with_state(Arc::clone(&state), apply_cors))
        .with_state(state)
}

// ============================================================================
// SECTION: CORS
// ============================================================================

/// Middleware stamping `Access-Control-Allow-Origin` on every response.
pub async fn apply_cors(
    State(state): State<Arc<ServerState>>,
    request: Request,
    next: Next,
) -> Response {
    let request_origin = request
        .headers()
        .get(ORIGIN)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string);
    let mut response = next.run(request).await;
    let origin = resolve_origin(&state.allowed_origins, request_origin.as_deref());
    if let Ok(value) = HeaderValue::from_str(&origin) {
        response.headers_mut().insert(ACCESS_CONTROL_ALLOW_ORIGIN, value);
    }
    response
}

/// Resolves the emitted origin from the configured list.
///
/// A wildcard entry wins; otherwise a request origin present in the list is
/// echoed; otherwise the first configured origin is emitted.
fn resolve_origin(allowed: &[String], request_origin: Option<&str>) -> String {
    if allowed.iter().any(|origin| origin == "*") {
        return "*".to_string();
    }
    if let Some(origin) = request_origin
        && allowed.iter().any(|candidate| candidate == origin)
    {
        return origin.to_string();
    }
    allowed.first().cloned().unwrap_or_else(|| "*".to_string())
}
