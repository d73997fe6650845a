// crates/secchiware-c2/src/environments.rs
// ============================================================================
// Module: Environment Registry
// Description: Node registration lifecycle and the active-node table.
// Purpose: Keep the broker's live-node view and the session history in step.
// Dependencies: axum, secchiware-core, serde, serde_json
// ============================================================================

//! ## Overview
//! `POST /environments` opens a session and inserts the broker entry;
//! `DELETE /environments/{ip}/{port}` closes the session and removes it.
//! Both run under the per-endpoint broker mutex, which totally orders
//! open/close for one endpoint. A registration arriving while an entry is
//! live replaces it: the stale session closes and a fresh one opens, which
//! is what a node restarting after a crash needs. `GET /environments` reads
//! the table without locks.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;

use axum::Json;
use axum::body::Bytes;
use axum::extract::Path;
use axum::extract::RawQuery;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::http::StatusCode;
use secchiware_core::ActiveEnvironment;
use secchiware_core::Arrange;
use secchiware_core::EnvironmentEndpoint;
use secchiware_core::KeyId;
use secchiware_core::PlatformInfo;
use secchiware_core::RegistrationRequest;
use secchiware_core::Timestamp;
use secchiware_core::parse_query_pairs;
use serde::Deserialize;
use serde::Serialize;

use crate::auth;
use crate::query;
use crate::server::ApiError;
use crate::server::ServerState;
use crate::server::acquire_lock;
use crate::server::release_lock;
use crate::telemetry::C2Operation;

// ============================================================================
// SECTION: Broker Keys
// ============================================================================

/// Key prefix of the active-node table.
pub(crate) const ACTIVE_PREFIX: &str = "secchiware:active:";

/// Returns the active-table key for an endpoint.
#[must_use]
pub(crate) fn active_key(endpoint: &EnvironmentEndpoint) -> String {
    format!("{ACTIVE_PREFIX}{}:{}", endpoint.ip, endpoint.port)
}

/// Returns the mutex name guarding an endpoint's table entry.
#[must_use]
pub(crate) fn env_lock_name(endpoint: &EnvironmentEndpoint) -> String {
    format!("secchiware:lock:env:{}:{}", endpoint.ip, endpoint.port)
}

/// Parses an endpoint back out of an active-table key.
#[must_use]
pub(crate) fn endpoint_from_key(key: &str) -> Option<EnvironmentEndpoint> {
    let rest = key.strip_prefix(ACTIVE_PREFIX)?;
    let (ip, port) = rest.rsplit_once(':')?;
    let port = port.parse::<u16>().ok()?;
    Some(EnvironmentEndpoint::new(ip, port))
}

/// Reads and decodes the active entry for an endpoint.
///
/// # Errors
///
/// Returns a 500 [`ApiError`] on broker failure or a corrupt entry.
pub(crate) fn active_entry(
    state: &ServerState,
    endpoint: &EnvironmentEndpoint,
) -> Result<Option<ActiveEnvironment>, ApiError> {
    let value = state.broker.get(&active_key(endpoint)).map_err(|_| ApiError::internal())?;
    value
        .map(|value| serde_json::from_value(value).map_err(|_| ApiError::internal()))
        .transpose()
}

// ============================================================================
// SECTION: Wire Types
// ============================================================================

/// One row of the `GET /environments` listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvironmentListing {
    /// Environment IP address.
    pub ip: String,
    /// Environment listener port.
    pub port: u16,
    /// Open session identifier.
    pub session_id: i64,
    /// Instant the session opened.
    pub session_start: Timestamp,
    /// Platform fingerprint reported at registration.
    pub platform: PlatformInfo,
}

// ============================================================================
// SECTION: Registration
// ============================================================================

/// `POST /environments`: opens a session and inserts the active entry.
pub async fn handle_register(
    State(state): State<Arc<ServerState>>,
    RawQuery(raw_query): RawQuery,
    headers: HeaderMap,
    body: Bytes,
) -> Result<StatusCode, ApiError> {
    let result = register(&state, raw_query.as_deref(), &headers, &body).await;
    state.record(C2Operation::Register, result.is_ok());
    result
}

/// Registration path; runs under the per-endpoint mutex.
async fn register(
    state: &ServerState,
    raw_query: Option<&str>,
    headers: &HeaderMap,
    body: &Bytes,
) -> Result<StatusCode, ApiError> {
    let key_id = auth::verify_request(
        &state.node_secrets,
        state.broker.as_ref(),
        state.skew,
        "POST",
        "/environments",
        raw_query,
        headers,
        Some(body.as_ref()),
    )?;
    let registration: RegistrationRequest = serde_json::from_slice(body)
        .map_err(|err| ApiError::validation(format!("invalid registration body: {err}")))?;
    let endpoint = EnvironmentEndpoint::new(registration.ip.clone(), registration.port);

    let lock_name = env_lock_name(&endpoint);
    let token = acquire_lock(state, &lock_name).await?;
    let outcome = open_registration(state, &endpoint, &registration.platform, key_id);
    release_lock(state, &lock_name, token);
    outcome?;
    Ok(StatusCode::NO_CONTENT)
}

/// Closes any stale session for the endpoint and opens a fresh one.
fn open_registration(
    state: &ServerState,
    endpoint: &EnvironmentEndpoint,
    platform: &PlatformInfo,
    key_id: KeyId,
) -> Result<(), ApiError> {
    let now = Timestamp::now();
    if let Some(stale) = state.store.find_active(endpoint)? {
        state.store.close_session(stale.id, &now)?;
        let _ = state.broker.delete(&active_key(endpoint));
    }
    let session_id = state.store.open_session(endpoint, platform, &now)?;
    let entry = ActiveEnvironment {
        session_id,
        session_start: now,
        key_id,
        platform: platform.clone(),
    };
    let value = serde_json::to_value(&entry).map_err(|_| ApiError::internal())?;
    state
        .broker
        .set(&active_key(endpoint), value, None)
        .map_err(|_| ApiError::internal())?;
    Ok(())
}

// ============================================================================
// SECTION: Deregistration
// ============================================================================

/// `DELETE /environments/{ip}/{port}`: closes the session, drops the entry.
pub async fn handle_deregister(
    State(state): State<Arc<ServerState>>,
    Path((ip, port)): Path<(String, String)>,
    RawQuery(raw_query): RawQuery,
    headers: HeaderMap,
) -> Result<StatusCode, ApiError> {
    let result = deregister(&state, &ip, &port, raw_query.as_deref(), &headers).await;
    state.record(C2Operation::Deregister, result.is_ok());
    result
}

/// Deregistration path; the caller's identity must match the entry.
async fn deregister(
    state: &ServerState,
    ip: &str,
    port: &str,
    raw_query: Option<&str>,
    headers: &HeaderMap,
) -> Result<StatusCode, ApiError> {
    let path = format!("/environments/{ip}/{port}");
    let key_id = auth::verify_request(
        &state.node_secrets,
        state.broker.as_ref(),
        state.skew,
        "DELETE",
        &path,
        raw_query,
        headers,
        None,
    )?;
    let port: u16 = port
        .parse()
        .map_err(|_| ApiError::validation(format!("invalid port: {port}")))?;
    let endpoint = EnvironmentEndpoint::new(ip, port);

    let lock_name = env_lock_name(&endpoint);
    let token = acquire_lock(state, &lock_name).await?;
    let outcome = close_registration(state, &endpoint, &key_id);
    release_lock(state, &lock_name, token);
    outcome
}

/// Closes the active session for an endpoint after an identity check.
fn close_registration(
    state: &ServerState,
    endpoint: &EnvironmentEndpoint,
    key_id: &KeyId,
) -> Result<StatusCode, ApiError> {
    let Some(entry) = active_entry(state, endpoint)? else {
        return Err(ApiError::not_found(format!("no active environment at {endpoint}")));
    };
    if &entry.key_id != key_id {
        return Err(ApiError::unauthorized("signing identity does not own this environment"));
    }
    state.store.close_session(entry.session_id, &Timestamp::now())?;
    let _ = state.broker.delete(&active_key(endpoint));
    Ok(StatusCode::NO_CONTENT)
}

// ============================================================================
// SECTION: Listing
// ============================================================================

/// Orderable columns for the environment listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum EnvironmentOrder {
    /// Order by IP address.
    #[default]
    Ip,
    /// Order by port.
    Port,
    /// Order by session start.
    SessionStart,
}

/// Validated filter set for the environment listing.
#[derive(Debug, Clone, Default)]
struct EnvironmentQuery {
    /// Restrict to these IPs.
    ips: Vec<String>,
    /// Restrict to these ports.
    ports: Vec<u16>,
    /// Restrict to these OS system names.
    systems: Vec<String>,
    /// Sort column.
    order_by: EnvironmentOrder,
    /// Sort direction.
    arrange: Arrange,
    /// Maximum rows returned.
    limit: Option<u64>,
    /// Rows skipped before the first returned row.
    offset: u64,
}

/// Parses the environment listing parameters strictly.
fn parse_environment_query(raw: &str) -> Result<EnvironmentQuery, ApiError> {
    let mut parsed = EnvironmentQuery::default();
    for (key, value) in parse_query_pairs(raw) {
        match key.as_str() {
            "ip" => parsed.ips = query::parse_string_list(&value),
            "port" => parsed.ports = query::parse_port_list("port", &value)?,
            "system" => parsed.systems = query::parse_string_list(&value),
            "order_by" => {
                parsed.order_by = match value.as_str() {
                    "ip" => EnvironmentOrder::Ip,
                    "port" => EnvironmentOrder::Port,
                    "session_start" => EnvironmentOrder::SessionStart,
                    other => {
                        return Err(ApiError::validation(format!("unknown order_by: {other}")));
                    }
                };
            }
            "arrange" => parsed.arrange = query::parse_arrange(&value)?,
            "limit" => parsed.limit = Some(query::parse_u64("limit", &value)?),
            "offset" => parsed.offset = query::parse_u64("offset", &value)?,
            other => return Err(ApiError::validation(format!("unknown query parameter: {other}"))),
        }
    }
    Ok(parsed)
}

/// `GET /environments`: lists live environments from the broker table.
pub async fn handle_list(
    State(state): State<Arc<ServerState>>,
    RawQuery(raw_query): RawQuery,
) -> Result<Json<Vec<EnvironmentListing>>, ApiError> {
    let result = list_environments(&state, raw_query.as_deref().unwrap_or(""));
    state.record(C2Operation::ListEnvironments, result.is_ok());
    result
}

/// Listing path; reads take no locks and tolerate table skew.
fn list_environments(
    state: &ServerState,
    raw_query: &str,
) -> Result<Json<Vec<EnvironmentListing>>, ApiError> {
    let parsed = parse_environment_query(raw_query)?;
    let keys = state.broker.keys(ACTIVE_PREFIX).map_err(|_| ApiError::internal())?;
    let mut listings = Vec::new();
    for key in keys {
        let Some(endpoint) = endpoint_from_key(&key) else {
            continue;
        };
        let Some(entry) = active_entry(state, &endpoint)? else {
            continue;
        };
        if !parsed.ips.is_empty() && !parsed.ips.contains(&endpoint.ip) {
            continue;
        }
        if !parsed.ports.is_empty() && !parsed.ports.contains(&endpoint.port) {
            continue;
        }
        if !parsed.systems.is_empty() && !parsed.systems.contains(&entry.platform.os.system) {
            continue;
        }
        listings.push(EnvironmentListing {
            ip: endpoint.ip,
            port: endpoint.port,
            session_id: entry.session_id,
            session_start: entry.session_start,
            platform: entry.platform,
        });
    }
    listings.sort_by(|a, b| {
        let ordering = match parsed.order_by {
            EnvironmentOrder::Ip => a.ip.cmp(&b.ip).then(a.port.cmp(&b.port)),
            EnvironmentOrder::Port => a.port.cmp(&b.port).then(a.ip.cmp(&b.ip)),
            EnvironmentOrder::SessionStart => a.session_start.cmp(&b.session_start),
        };
        match parsed.arrange {
            Arrange::Asc => ordering,
            Arrange::Desc => ordering.reverse(),
        }
    });
    let offset = usize::try_from(parsed.offset).unwrap_or(usize::MAX);
    let mut windowed: Vec<EnvironmentListing> = listings.into_iter().skip(offset).collect();
    if let Some(limit) = parsed.limit {
        windowed.truncate(usize::try_from(limit).unwrap_or(usize::MAX));
    }
    Ok(Json(windowed))
}
