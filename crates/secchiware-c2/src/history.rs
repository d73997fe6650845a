// crates/secchiware-c2/src/history.rs
// ============================================================================
// Module: History Endpoints
// Description: Searchable session and execution history over the store.
// Purpose: Serve filtered listings, session detail, and guarded deletion.
// Dependencies: axum, secchiware-core
// ============================================================================

//! ## Overview
//! History reads go straight to the durable store without locks. Parameter
//! validation is strict: unknown parameters, unknown `order_by` columns, bad
//! `arrange` directions, and malformed values fail with 400. Deleting a
//! session requires a Client signature, targets only finished sessions, and
//! cascades to executions and reports.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;

use axum::Json;
use axum::extract::Path;
use axum::extract::RawQuery;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::http::StatusCode;
use secchiware_core::ExecutionOrder;
use secchiware_core::ExecutionQuery;
use secchiware_core::ExecutionRecord;
use secchiware_core::SessionDetail;
use secchiware_core::SessionOrder;
use secchiware_core::SessionQuery;
use secchiware_core::SessionRecord;
use secchiware_core::parse_query_pairs;

use crate::auth;
use crate::query;
use crate::server::ApiError;
use crate::server::ServerState;
use crate::telemetry::C2Operation;

// ============================================================================
// SECTION: Parameter Parsing
// ============================================================================

/// Parses the `GET /sessions` parameters strictly.
fn parse_session_query(raw: &str) -> Result<SessionQuery, ApiError> {
    let mut parsed = SessionQuery::default();
    for (key, value) in parse_query_pairs(raw) {
        match key.as_str() {
            "ids" => parsed.ids = query::parse_i64_list("ids", &value)?,
            "ip" => parsed.ips = query::parse_string_list(&value),
            "port" => parsed.ports = query::parse_port_list("port", &value)?,
            "system" => parsed.systems = query::parse_string_list(&value),
            "started_after" => {
                parsed.started_after = Some(query::parse_timestamp("started_after", &value)?);
            }
            "started_before" => {
                parsed.started_before = Some(query::parse_timestamp("started_before", &value)?);
            }
            "closed_after" => {
                parsed.closed_after = Some(query::parse_timestamp("closed_after", &value)?);
            }
            "closed_before" => {
                parsed.closed_before = Some(query::parse_timestamp("closed_before", &value)?);
            }
            "order_by" => {
                parsed.order_by = SessionOrder::parse(&value)
                    .ok_or_else(|| ApiError::validation(format!("unknown order_by: {value}")))?;
            }
            "arrange" => parsed.arrange = query::parse_arrange(&value)?,
            "limit" => parsed.limit = Some(query::parse_u64("limit", &value)?),
            "offset" => parsed.offset = query::parse_u64("offset", &value)?,
            other => return Err(ApiError::validation(format!("unknown query parameter: {other}"))),
        }
    }
    Ok(parsed)
}

/// Parses the `GET /executions` parameters strictly.
fn parse_execution_query(raw: &str) -> Result<ExecutionQuery, ApiError> {
    let mut parsed = ExecutionQuery::default();
    for (key, value) in parse_query_pairs(raw) {
        match key.as_str() {
            "ids" => parsed.ids = query::parse_i64_list("ids", &value)?,
            "sessions" => parsed.sessions = query::parse_i64_list("sessions", &value)?,
            "registered_after" => {
                parsed.registered_after =
                    Some(query::parse_timestamp("registered_after", &value)?);
            }
            "registered_before" => {
                parsed.registered_before =
                    Some(query::parse_timestamp("registered_before", &value)?);
            }
            "order_by" => {
                parsed.order_by = ExecutionOrder::parse(&value)
                    .ok_or_else(|| ApiError::validation(format!("unknown order_by: {value}")))?;
            }
            "arrange" => parsed.arrange = query::parse_arrange(&value)?,
            "limit" => parsed.limit = Some(query::parse_u64("limit", &value)?),
            "offset" => parsed.offset = query::parse_u64("offset", &value)?,
            other => return Err(ApiError::validation(format!("unknown query parameter: {other}"))),
        }
    }
    Ok(parsed)
}

/// Parses a decimal row identifier from a path segment.
fn parse_row_id(raw: &str) -> Result<i64, ApiError> {
    raw.parse::<i64>().map_err(|_| ApiError::validation(format!("invalid id: {raw}")))
}

// ============================================================================
// SECTION: Handlers
// ============================================================================

/// `GET /sessions`: filtered session listing.
pub async fn handle_list_sessions(
    State(state): State<Arc<ServerState>>,
    RawQuery(raw_query): RawQuery,
) -> Result<Json<Vec<SessionRecord>>, ApiError> {
    let result = parse_session_query(raw_query.as_deref().unwrap_or(""))
        .and_then(|parsed| state.store.list_sessions(&parsed).map_err(ApiError::from))
        .map(Json);
    state.record(C2Operation::QuerySessions, result.is_ok());
    result
}

/// `GET /sessions/{id}`: one session with executions and reports.
pub async fn handle_session_detail(
    State(state): State<Arc<ServerState>>,
    Path(id): Path<String>,
) -> Result<Json<SessionDetail>, ApiError> {
    let result = parse_row_id(&id)
        .and_then(|id| state.store.session_detail(id).map_err(ApiError::from))
        .and_then(|detail| {
            detail.map(Json).ok_or_else(|| ApiError::not_found(format!("session {id}")))
        });
    state.record(C2Operation::QuerySessions, result.is_ok());
    result
}

/// `DELETE /sessions/{id}`: deletes a finished session and its evidence.
pub async fn handle_delete_session(
    State(state): State<Arc<ServerState>>,
    Path(id): Path<String>,
    RawQuery(raw_query): RawQuery,
    headers: HeaderMap,
) -> Result<StatusCode, ApiError> {
    let result = delete_session(&state, &id, raw_query.as_deref(), &headers);
    state.record(C2Operation::DeleteSession, result.is_ok());
    result
}

/// Deletion path; active sessions are rejected with 400.
fn delete_session(
    state: &ServerState,
    id: &str,
    raw_query: Option<&str>,
    headers: &HeaderMap,
) -> Result<StatusCode, ApiError> {
    let path = format!("/sessions/{id}");
    auth::verify_request(
        &state.client_secrets,
        state.broker.as_ref(),
        state.skew,
        "DELETE",
        &path,
        raw_query,
        headers,
        None,
    )?;
    let id = parse_row_id(id)?;
    state.store.delete_session(id)?;
    Ok(StatusCode::NO_CONTENT)
}

/// `GET /executions`: filtered execution listing.
pub async fn handle_list_executions(
    State(state): State<Arc<ServerState>>,
    RawQuery(raw_query): RawQuery,
) -> Result<Json<Vec<ExecutionRecord>>, ApiError> {
    let result = parse_execution_query(raw_query.as_deref().unwrap_or(""))
        .and_then(|parsed| state.store.list_executions(&parsed).map_err(ApiError::from))
        .map(Json);
    state.record(C2Operation::QueryExecutions, result.is_ok());
    result
}
