// crates/secchiware-node/src/server.rs
// ============================================================================
// Module: Node HTTP Server
// Description: Axum handlers for the node's control surface.
// Purpose: Serve listings, installs, executions, and shutdown requests.
// Dependencies: axum, tokio, secchiware-core, secchiware-bundle
// ============================================================================

//! ## Overview
//! The node exposes five routes: unauthenticated tree listing and test
//! execution, and C2-signed bundle install, package removal, and shutdown.
//! Executions are serialized through a single lock and run on the blocking
//! pool; registry mutations are serialized through a writer lock. Every
//! non-2xx response carries the `{"error": ...}` envelope, and 401 responses
//! carry the scheme challenge.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;
use std::time::Duration;

use axum::Json;
use axum::Router;
use axum::body::Bytes;
use axum::extract::Path;
use axum::extract::RawQuery;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::http::StatusCode;
use axum::http::header::CONTENT_TYPE;
use axum::http::header::WWW_AUTHENTICATE;
use axum::response::IntoResponse;
use axum::response::Response;
use axum::routing::delete;
use axum::routing::get;
use secchiware_bundle::RegistryError;
use secchiware_bundle::TestRegistry;
use secchiware_bundle::multipart;
use secchiware_bundle::multipart::MultipartError;
use secchiware_bundle::runner;
use secchiware_core::CacheBroker;
use secchiware_core::ExecutionSelector;
use secchiware_core::PackageInfo;
use secchiware_core::SelectorError;
use secchiware_core::TestReport;
use secchiware_core::parse_query_pairs;
use secchiware_core::signing::SCHEME;
use secchiware_core::signing::StaticSecrets;
use secchiware_core::signing::VerifyError;
use serde_json::json;
use tokio::sync::Mutex;
use tokio::sync::mpsc;

use crate::auth;
use crate::telemetry::NodeEndpoint;
use crate::telemetry::NodeMetricEvent;
use crate::telemetry::NodeMetrics;
use crate::telemetry::NodeOutcome;

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

    /// Builds a 500 internal error with a generic wire message.
    #[must_use]
    pub fn internal() -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: "internal error".to_string(),
            challenge: false,
        }
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

// ============================================================================
// SECTION: Server State
// ============================================================================

/// Shared state behind every node handler.
///
/// # Invariants
/// - `execution_lock` serializes test executions.
/// - `mutation_lock` serializes registry-mutating requests.
pub struct ServerState {
    /// Installed test registry.
    registry: TestRegistry,
    /// Broker used for replay tracking.
    broker: Arc<dyn CacheBroker>,
    /// Accepted C2 signing secrets.
    secrets: StaticSecrets,
    /// Signature freshness window.
    skew: Duration,
    /// Single-execution lock.
    execution_lock: Mutex<()>,
    /// Single-writer lock for registry mutations.
    mutation_lock: Mutex<()>,
    /// Channel used to request listener shutdown.
    shutdown: mpsc::Sender<()>,
    /// Metrics sink.
    metrics: Arc<dyn NodeMetrics>,
}

impl ServerState {
    /// Builds the node server state.
    #[must_use]
    pub fn new(
        registry: TestRegistry,
        broker: Arc<dyn CacheBroker>,
        secrets: StaticSecrets,
        skew: Duration,
        shutdown: mpsc::Sender<()>,
        metrics: Arc<dyn NodeMetrics>,
    ) -> Self {
        Self {
            registry,
            broker,
            secrets,
            skew,
            execution_lock: Mutex::new(()),
            mutation_lock: Mutex::new(()),
            shutdown,
            metrics,
        }
    }

    /// Returns the installed test registry.
    #[must_use]
    pub const fn registry(&self) -> &TestRegistry {
        &self.registry
    }

    /// Verifies a C2 signature over an inbound request.
    fn authorize(
        &self,
        method: &str,
        path: &str,
        query: Option<&str>,
        headers: &HeaderMap,
        body: Option<&[u8]>,
    ) -> Result<(), ApiError> {
        auth::verify_request(
            &self.secrets,
            self.broker.as_ref(),
            self.skew,
            method,
            path,
            query,
            headers,
            body,
        )?;
        Ok(())
    }

    /// Records a request outcome.
    fn record(&self, endpoint: NodeEndpoint, ok: bool) {
        self.metrics.record_request(NodeMetricEvent {
            endpoint,
            outcome: if ok { NodeOutcome::Ok } else { NodeOutcome::Error },
        });
    }
}

// ============================================================================
// SECTION: Router
// ============================================================================

/// Builds the node router over shared state.
#[must_use]
pub fn build_router(state: Arc<ServerState>) -> Router {
    Router::new()
        .route("/test_sets", get(handle_list_test_sets).patch(handle_install_bundle))
        .route("/test_sets/{package}", delete(handle_remove_package))
        .route("/reports", get(handle_run_reports))
        .route("/", delete(handle_shutdown))
        .with_state(state)
}

// ============================================================================
// SECTION: Handlers
// ============================================================================

/// `GET /test_sets`: returns the recursive package tree.
pub async fn handle_list_test_sets(
    State(state): State<Arc<ServerState>>,
) -> Result<Json<Vec<PackageInfo>>, ApiError> {
    let result = state
        .registry
        .snapshot()
        .map(|snapshot| Json(snapshot.tree().to_vec()))
        .map_err(ApiError::from);
    state.record(NodeEndpoint::ListTestSets, result.is_ok());
    result
}

/// `GET /reports`: executes the selected tests and returns their reports.
pub async fn handle_run_reports(
    State(state): State<Arc<ServerState>>,
    RawQuery(query): RawQuery,
) -> Result<Json<Vec<TestReport>>, ApiError> {
    let result = run_reports(&state, query.as_deref()).await;
    state.record(NodeEndpoint::RunReports, result.is_ok());
    result
}

/// Executes the selection; split out so the outcome can be recorded once.
async fn run_reports(
    state: &Arc<ServerState>,
    query: Option<&str>,
) -> Result<Json<Vec<TestReport>>, ApiError> {
    let pairs = parse_query_pairs(query.unwrap_or(""));
    let selector = ExecutionSelector::from_query_pairs(&pairs)?;
    let snapshot = state.registry.snapshot()?;
    let plan = runner::plan(&snapshot, &selector)?;
    let _execution = state.execution_lock.lock().await;
    let reports = tokio::task::spawn_blocking(move || runner::execute(&plan))
        .await
        .map_err(|_| ApiError::internal())?;
    Ok(Json(reports))
}

/// `PATCH /test_sets`: verifies, extracts, and merge-installs a bundle.
pub async fn handle_install_bundle(
    State(state): State<Arc<ServerState>>,
    RawQuery(query): RawQuery,
    headers: HeaderMap,
    body: Bytes,
) -> Result<StatusCode, ApiError> {
    let result = install_bundle(&state, query.as_deref(), &headers, &body).await;
    state.record(NodeEndpoint::InstallBundle, result.is_ok());
    result
}

/// Install path; digest verification precedes any body parsing.
async fn install_bundle(
    state: &Arc<ServerState>,
    query: Option<&str>,
    headers: &HeaderMap,
    body: &Bytes,
) -> Result<StatusCode, ApiError> {
    state.authorize("PATCH", "/test_sets", query, headers, Some(body.as_ref()))?;
    let content_type = headers
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .ok_or_else(|| ApiError::unsupported_media("missing content type"))?;
    let boundary = multipart::parse_boundary(content_type)?;
    let bundle = multipart::extract_part(body, &boundary, multipart::BUNDLE_PART_NAME)?;
    let _writer = state.mutation_lock.lock().await;
    let shared = Arc::clone(state);
    tokio::task::spawn_blocking(move || shared.registry.install_bundle(&bundle))
        .await
        .map_err(|_| ApiError::internal())??;
    Ok(StatusCode::NO_CONTENT)
}

/// `DELETE /test_sets/{package}`: removes a root package and descendants.
pub async fn handle_remove_package(
    State(state): State<Arc<ServerState>>,
    Path(package): Path<String>,
    RawQuery(query): RawQuery,
    headers: HeaderMap,
) -> Result<StatusCode, ApiError> {
    let result = remove_package(&state, &package, query.as_deref(), &headers).await;
    state.record(NodeEndpoint::RemovePackage, result.is_ok());
    result
}

/// Removal path; the signed path includes the package segment.
async fn remove_package(
    state: &Arc<ServerState>,
    package: &str,
    query: Option<&str>,
    headers: &HeaderMap,
) -> Result<StatusCode, ApiError> {
    let path = format!("/test_sets/{package}");
    state.authorize("DELETE", &path, query, headers, None)?;
    let _writer = state.mutation_lock.lock().await;
    let shared = Arc::clone(state);
    let package = package.to_string();
    tokio::task::spawn_blocking(move || shared.registry.remove_package(&package))
        .await
        .map_err(|_| ApiError::internal())??;
    Ok(StatusCode::NO_CONTENT)
}

/// `DELETE /`: acknowledges, then stops the listener.
pub async fn handle_shutdown(
    State(state): State<Arc<ServerState>>,
    RawQuery(query): RawQuery,
    headers: HeaderMap,
) -> Result<StatusCode, ApiError> {
    let result = state
        .authorize("DELETE", "/", query.as_deref(), &headers, None)
        .map(|()| {
            let _ = state.shutdown.try_send(());
            StatusCode::NO_CONTENT
        });
    state.record(NodeEndpoint::Shutdown, result.is_ok());
    result
}
