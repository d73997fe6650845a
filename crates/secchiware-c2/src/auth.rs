// crates/secchiware-c2/src/auth.rs
// ============================================================================
// Module: C2 Request Authentication
// Description: Client- and node-signed request verification.
// Purpose: Bridge axum requests into the shared signing verifier per role.
// Dependencies: axum, secchiware-core
// ============================================================================

//! ## Overview
//! The C2 accepts two signing roles: Clients (operator tools) and Nodes.
//! Each role has its own secret directory, so a node identity can never
//! satisfy a client-gated endpoint or vice versa. Verification runs the full
//! `SECCHIWARE-HMAC-256` check with replay tracking through the broker.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::time::Duration;

use axum::http::HeaderMap;
use secchiware_core::CacheBroker;
use secchiware_core::KeyId;
use secchiware_core::Timestamp;
use secchiware_core::signing::InboundRequest;
use secchiware_core::signing::SecretDirectory;
use secchiware_core::signing::Verifier;
use secchiware_core::signing::VerifyError;

// ============================================================================
// SECTION: Header Lowering
// ============================================================================

/// Lowers an axum header map to lowercase name/value pairs.
///
/// Values that are not valid UTF-8 are dropped; a signed header that was
/// dropped fails verification as missing.
#[must_use]
pub fn header_lookup(headers: &HeaderMap) -> BTreeMap<String, String> {
    let mut lookup = BTreeMap::new();
    for (name, value) in headers {
        if let Ok(value) = value.to_str() {
            lookup.insert(name.as_str().to_ascii_lowercase(), value.to_string());
        }
    }
    lookup
}

// ============================================================================
// SECTION: Verification
// ============================================================================

/// Verifies an inbound request against one role's secret directory.
///
/// # Errors
///
/// Returns [`VerifyError`] naming the first failed check.
pub fn verify_request(
    secrets: &dyn SecretDirectory,
    broker: &dyn CacheBroker,
    skew: Duration,
    method: &str,
    path: &str,
    query: Option<&str>,
    headers: &HeaderMap,
    body: Option<&[u8]>,
) -> Result<KeyId, VerifyError> {
    let lookup = header_lookup(headers);
    let verifier = Verifier {
        secrets,
        broker,
        skew,
        now: Timestamp::now(),
    };
    verifier.verify(&InboundRequest {
        method,
        path,
        query,
        headers: &lookup,
        body,
    })
}
