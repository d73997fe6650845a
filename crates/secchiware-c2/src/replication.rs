// crates/secchiware-c2/src/replication.rs
// ============================================================================
// Module: Node Replication & Execution Proxy
// Description: Signed outbound node requests and their client-facing routes.
// Purpose: Replicate repository packages and proxy test executions.
// Dependencies: axum, reqwest, secchiware-bundle, secchiware-core
// ============================================================================

//! ## Overview
//! Two client-facing routes drive nodes: replication packs repository
//! packages into a bundle and issues a node-signed `PATCH /test_sets`;
//! report proxying forwards selectors as a signed `GET /reports`, persists
//! the returned evidence, and hands it back. Node failures map onto the
//! gateway statuses: 502 for protocol violations, 504 for timeouts and
//! refused connections; node error statuses pass through unchanged.
//! Reports are returned to the client even when persistence fails.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;
use std::time::Duration;

use axum::Json;
use axum::body::Bytes;
use axum::extract::Path;
use axum::extract::RawQuery;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::http::StatusCode;
use reqwest::Client;
use reqwest::Response;
use reqwest::header::AUTHORIZATION;
use reqwest::header::CONTENT_TYPE;
use secchiware_bundle::multipart;
use secchiware_core::ActiveEnvironment;
use secchiware_core::EnvironmentEndpoint;
use secchiware_core::ExecutionSelector;
use secchiware_core::TestReport;
use secchiware_core::Timestamp;
use secchiware_core::is_identifier;
use secchiware_core::parse_query_pairs;
use secchiware_core::signing::RequestSigner;
use secchiware_core::signing::SecretDirectory;
use thiserror::Error;

use crate::auth;
use crate::environments;
use crate::server::ApiError;
use crate::server::ServerState;
use crate::telemetry::C2Operation;

// ============================================================================
// SECTION: Upstream Errors
// ============================================================================

/// Failures talking to a node.
///
/// # Invariants
/// - `Unreachable` maps to 504; `Protocol` maps to 502; `Status` passes the
///   node's status through.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum UpstreamError {
    /// Outbound HTTP client could not be constructed.
    #[error("node client build failed: {0}")]
    Client(String),
    /// Timeout or connection failure.
    #[error("node unreachable: {0}")]
    Unreachable(String),
    /// The node broke the protocol (malformed body, signing failure).
    #[error("node protocol error: {0}")]
    Protocol(String),
    /// The node answered with a non-success status.
    #[error("node returned {status}: {message}")]
    Status {
        /// Node response status code.
        status: u16,
        /// Error envelope message, when present.
        message: String,
    },
}

// ============================================================================
// SECTION: Node Client
// ============================================================================

/// Outbound HTTP client for node requests.
///
/// # Invariants
/// - Every request runs under the configured timeout.
/// - Mutating requests are signed with the target node's shared secret.
pub struct NodeClient {
    /// HTTP client with bounded timeout.
    http: Client,
}

impl NodeClient {
    /// Builds a node client with the given request timeout.
    ///
    /// # Errors
    ///
    /// Returns [`UpstreamError::Client`] when the HTTP client cannot be
    /// constructed.
    pub fn new(timeout: Duration) -> Result<Self, UpstreamError> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| UpstreamError::Client(err.to_string()))?;
        Ok(Self {
            http,
        })
    }

    /// Classifies a reqwest transport error.
    fn transport_error(err: &reqwest::Error) -> UpstreamError {
        if err.is_timeout() || err.is_connect() {
            UpstreamError::Unreachable(err.to_string())
        } else {
            UpstreamError::Protocol(err.to_string())
        }
    }

    /// Reads a node error envelope into a status error.
    async fn status_error(response: Response) -> UpstreamError {
        let status = response.status().as_u16();
        let message = response
            .json::<serde_json::Value>()
            .await
            .ok()
            .and_then(|value| value.get("error").and_then(|err| err.as_str()).map(str::to_string))
            .unwrap_or_else(|| "node rejected the request".to_string());
        UpstreamError::Status {
            status,
            message,
        }
    }

    /// Probes a node's health through its unauthenticated listing route.
    ///
    /// # Errors
    ///
    /// Returns [`UpstreamError`] when the node is unreachable or answers
    /// with a failure status.
    pub async fn probe(
        &self,
        endpoint: &EnvironmentEndpoint,
        timeout: Duration,
    ) -> Result<(), UpstreamError> {
        let url = format!("http://{endpoint}/test_sets");
        let response = self
            .http
            .get(url)
            .timeout(timeout)
            .send()
            .await
            .map_err(|err| Self::transport_error(&err))?;
        if response.status().is_success() {
            Ok(())
        } else {
            Err(Self::status_error(response).await)
        }
    }

    /// Installs a bundle on a node with a signed `PATCH /test_sets`.
    ///
    /// # Errors
    ///
    /// Returns [`UpstreamError`] on signing, transport, or node failure.
    pub async fn install_bundle(
        &self,
        endpoint: &EnvironmentEndpoint,
        signer: &RequestSigner,
        bundle: &[u8],
    ) -> Result<(), UpstreamError> {
        let body = multipart::encode_bundle_body(bundle);
        let signed = signer
            .sign(
                "PATCH",
                "/test_sets",
                None,
                &endpoint.to_string(),
                &Timestamp::now(),
                Some(&body),
            )
            .map_err(|err| UpstreamError::Protocol(err.to_string()))?;
        let mut outbound = self
            .http
            .patch(format!("http://{endpoint}/test_sets"))
            .header(CONTENT_TYPE, multipart::bundle_content_type())
            .body(body);
        for (name, value) in &signed.headers {
            outbound = outbound.header(name, value);
        }
        let response = outbound
            .header(AUTHORIZATION, signed.authorization)
            .send()
            .await
            .map_err(|err| Self::transport_error(&err))?;
        if response.status().is_success() {
            Ok(())
        } else {
            Err(Self::status_error(response).await)
        }
    }

    /// Runs a selection on a node with a signed `GET /reports`.
    ///
    /// # Errors
    ///
    /// Returns [`UpstreamError`] on signing, transport, malformed report
    /// arrays, or node failure statuses.
    pub async fn fetch_reports(
        &self,
        endpoint: &EnvironmentEndpoint,
        signer: &RequestSigner,
        query: Option<&str>,
    ) -> Result<Vec<TestReport>, UpstreamError> {
        let signed = signer
            .sign("GET", "/reports", query, &endpoint.to_string(), &Timestamp::now(), None)
            .map_err(|err| UpstreamError::Protocol(err.to_string()))?;
        let mut url = format!("http://{endpoint}/reports");
        if let Some(query) = query {
            url.push('?');
            url.push_str(query);
        }
        let mut outbound = self.http.get(url);
        for (name, value) in &signed.headers {
            outbound = outbound.header(name, value);
        }
        let response = outbound
            .header(AUTHORIZATION, signed.authorization)
            .send()
            .await
            .map_err(|err| Self::transport_error(&err))?;
        if !response.status().is_success() {
            return Err(Self::status_error(response).await);
        }
        response
            .json::<Vec<TestReport>>()
            .await
            .map_err(|err| UpstreamError::Protocol(format!("malformed report array: {err}")))
    }
}

// ============================================================================
// SECTION: Outbound Signing
// ============================================================================

/// Builds the outbound signer for the node a broker entry belongs to.
///
/// The C2 signs with its own identity using the shared secret of the node's
/// pair, which the node verifies as its configured C2 key.
fn outbound_signer(state: &ServerState, entry: &ActiveEnvironment) -> Result<RequestSigner, ApiError> {
    let secret = state.node_secrets.secret(&entry.key_id).ok_or_else(ApiError::internal)?;
    Ok(RequestSigner::new(state.c2_key_id.clone(), secret))
}

/// Parses an endpoint out of path segments.
fn parse_endpoint(ip: &str, port: &str) -> Result<EnvironmentEndpoint, ApiError> {
    let port: u16 =
        port.parse().map_err(|_| ApiError::validation(format!("invalid port: {port}")))?;
    Ok(EnvironmentEndpoint::new(ip, port))
}

/// Looks up the active entry or fails with 404.
fn require_entry(
    state: &ServerState,
    endpoint: &EnvironmentEndpoint,
) -> Result<ActiveEnvironment, ApiError> {
    environments::active_entry(state, endpoint)?
        .ok_or_else(|| ApiError::not_found(format!("no active environment at {endpoint}")))
}

// ============================================================================
// SECTION: Replication Handler
// ============================================================================

/// `PATCH /environments/{ip}/{port}/installed`: replicates packages.
pub async fn handle_replicate(
    State(state): State<Arc<ServerState>>,
    Path((ip, port)): Path<(String, String)>,
    RawQuery(raw_query): RawQuery,
    headers: HeaderMap,
    body: Bytes,
) -> Result<StatusCode, ApiError> {
    let result = replicate(&state, &ip, &port, raw_query.as_deref(), &headers, &body).await;
    state.record(C2Operation::Replicate, result.is_ok());
    result
}

/// Replication path: pack from the repository, push signed to the node.
async fn replicate(
    state: &Arc<ServerState>,
    ip: &str,
    port: &str,
    raw_query: Option<&str>,
    headers: &HeaderMap,
    body: &Bytes,
) -> Result<StatusCode, ApiError> {
    let path = format!("/environments/{ip}/{port}/installed");
    auth::verify_request(
        &state.client_secrets,
        state.broker.as_ref(),
        state.skew,
        "PATCH",
        &path,
        raw_query,
        headers,
        Some(body.as_ref()),
    )?;
    let packages: Vec<String> = serde_json::from_slice(body).map_err(|_| {
        ApiError::validation("body must be a JSON array of root package names")
    })?;
    if packages.is_empty() {
        return Err(ApiError::validation("at least one package name is required"));
    }
    for package in &packages {
        if !is_identifier(package) {
            return Err(ApiError::validation(format!("invalid package name: {package}")));
        }
    }
    let endpoint = parse_endpoint(ip, port)?;
    let entry = require_entry(state, &endpoint)?;
    let signer = outbound_signer(state, &entry)?;

    let shared = Arc::clone(state);
    let bundle = tokio::task::spawn_blocking(move || shared.repository.pack_packages(&packages))
        .await
        .map_err(|_| ApiError::internal())??;
    state.node_client.install_bundle(&endpoint, &signer, &bundle).await?;
    Ok(StatusCode::NO_CONTENT)
}

// ============================================================================
// SECTION: Report Proxy Handler
// ============================================================================

/// `GET /environments/{ip}/{port}/reports`: proxies a test execution.
pub async fn handle_proxy_reports(
    State(state): State<Arc<ServerState>>,
    Path((ip, port)): Path<(String, String)>,
    RawQuery(raw_query): RawQuery,
    headers: HeaderMap,
) -> Result<Json<Vec<TestReport>>, ApiError> {
    let result = proxy_reports(&state, &ip, &port, raw_query.as_deref(), &headers).await;
    state.record(C2Operation::ProxyReports, result.is_ok());
    result
}

/// Proxy path: forward the selection, persist best-effort, return reports.
async fn proxy_reports(
    state: &ServerState,
    ip: &str,
    port: &str,
    raw_query: Option<&str>,
    headers: &HeaderMap,
) -> Result<Json<Vec<TestReport>>, ApiError> {
    let path = format!("/environments/{ip}/{port}/reports");
    auth::verify_request(
        &state.client_secrets,
        state.broker.as_ref(),
        state.skew,
        "GET",
        &path,
        raw_query,
        headers,
        None,
    )?;
    let pairs = parse_query_pairs(raw_query.unwrap_or(""));
    let selector = ExecutionSelector::from_query_pairs(&pairs)?;
    let endpoint = parse_endpoint(ip, port)?;
    let entry = require_entry(state, &endpoint)?;
    let signer = outbound_signer(state, &entry)?;

    let forward = selector.to_query_string();
    let reports = state
        .node_client
        .fetch_reports(&endpoint, &signer, forward.as_deref())
        .await?;

    // Best-effort durability: the evidence goes back to the client even when
    // persistence fails.
    let now = Timestamp::now();
    let persisted = state
        .store
        .open_execution(entry.session_id, &now)
        .and_then(|execution_id| state.store.record_reports(execution_id, &reports));
    if persisted.is_err() {
        state.record(C2Operation::PersistenceDropped, false);
    }
    Ok(Json(reports))
}
