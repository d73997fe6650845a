// crates/secchiware-c2/src/repository.rs
// ============================================================================
// Module: Master Repository Endpoints
// Description: CRUD over the C2's master test repository.
// Purpose: Hold the bundles operators push before replicating to nodes.
// Dependencies: axum, secchiware-bundle, secchiware-core
// ============================================================================

//! ## Overview
//! The repository is a test root on the C2 host served through the same
//! bundle machinery nodes use. Listing is unauthenticated; installs and
//! removals require a Client signature and run under per-package broker
//! mutexes so concurrent pushes of unrelated packages never block each
//! other. Merge semantics match the node loader exactly.

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
use axum::http::header::CONTENT_TYPE;
use secchiware_bundle::archive;
use secchiware_bundle::multipart;
use secchiware_core::FencingToken;
use secchiware_core::PackageInfo;

use crate::auth;
use crate::server::ApiError;
use crate::server::ServerState;
use crate::server::acquire_lock;
use crate::server::release_lock;
use crate::telemetry::C2Operation;

// ============================================================================
// SECTION: Broker Keys
// ============================================================================

/// Returns the mutex name guarding one repository package.
#[must_use]
pub(crate) fn repo_lock_name(package: &str) -> String {
    format!("secchiware:lock:repo:{package}")
}

// ============================================================================
// SECTION: Handlers
// ============================================================================

/// `GET /test_sets`: returns the repository package tree.
pub async fn handle_list(
    State(state): State<Arc<ServerState>>,
) -> Result<Json<Vec<PackageInfo>>, ApiError> {
    let result = state
        .repository
        .snapshot()
        .map(|snapshot| Json(snapshot.tree().to_vec()))
        .map_err(ApiError::from);
    state.record(C2Operation::ListRepository, result.is_ok());
    result
}

/// `PATCH /test_sets`: merges a client-pushed bundle into the repository.
pub async fn handle_install(
    State(state): State<Arc<ServerState>>,
    RawQuery(raw_query): RawQuery,
    headers: HeaderMap,
    body: Bytes,
) -> Result<StatusCode, ApiError> {
    let result = install(&state, raw_query.as_deref(), &headers, &body).await;
    state.record(C2Operation::InstallRepository, result.is_ok());
    result
}

/// Install path; digest verification precedes any body parsing.
async fn install(
    state: &Arc<ServerState>,
    raw_query: Option<&str>,
    headers: &HeaderMap,
    body: &Bytes,
) -> Result<StatusCode, ApiError> {
    auth::verify_request(
        &state.client_secrets,
        state.broker.as_ref(),
        state.skew,
        "PATCH",
        "/test_sets",
        raw_query,
        headers,
        Some(body.as_ref()),
    )?;
    let content_type = headers
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .ok_or_else(|| ApiError::unsupported_media("missing content type"))?;
    let boundary = multipart::parse_boundary(content_type)?;
    let bundle = multipart::extract_part(body, &boundary, multipart::BUNDLE_PART_NAME)?;

    // Per-package mutexes, taken in sorted order.
    let roots = archive::bundle_roots(&bundle).map_err(|err| ApiError::validation(err.to_string()))?;
    let mut held: Vec<(String, FencingToken)> = Vec::with_capacity(roots.len());
    for root in &roots {
        let name = repo_lock_name(root);
        match acquire_lock(state, &name).await {
            Ok(token) => held.push((name, token)),
            Err(err) => {
                for (name, token) in held {
                    release_lock(state, &name, token);
                }
                return Err(err);
            }
        }
    }

    let shared = Arc::clone(state);
    let outcome = tokio::task::spawn_blocking(move || shared.repository.install_bundle(&bundle))
        .await
        .map_err(|_| ApiError::internal());
    for (name, token) in held {
        release_lock(state, &name, token);
    }
    outcome??;
    Ok(StatusCode::NO_CONTENT)
}

/// `DELETE /test_sets/{package}`: removes a repository package.
pub async fn handle_remove(
    State(state): State<Arc<ServerState>>,
    Path(package): Path<String>,
    RawQuery(raw_query): RawQuery,
    headers: HeaderMap,
) -> Result<StatusCode, ApiError> {
    let result = remove(&state, &package, raw_query.as_deref(), &headers).await;
    state.record(C2Operation::RemoveRepository, result.is_ok());
    result
}

/// Removal path; the signed path includes the package segment.
async fn remove(
    state: &Arc<ServerState>,
    package: &str,
    raw_query: Option<&str>,
    headers: &HeaderMap,
) -> Result<StatusCode, ApiError> {
    let path = format!("/test_sets/{package}");
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
    let lock_name = repo_lock_name(package);
    let token = acquire_lock(state, &lock_name).await?;
    let shared = Arc::clone(state);
    let package = package.to_string();
    let outcome = tokio::task::spawn_blocking(move || shared.repository.remove_package(&package))
        .await
        .map_err(|_| ApiError::internal());
    release_lock(state, &lock_name, token);
    outcome??;
    Ok(StatusCode::NO_CONTENT)
}
