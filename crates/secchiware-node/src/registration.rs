// crates/secchiware-node/src/registration.rs
// ============================================================================
// Module: C2 Registration Client
// Description: Node-signed registration and deregistration against the C2.
// Purpose: Announce the node's endpoint and fingerprint; retire it on exit.
// Dependencies: reqwest, secchiware-core, serde_json
// ============================================================================

//! ## Overview
//! At startup the node posts its endpoint and platform fingerprint to the
//! C2, signed with its own identity. On shutdown it retires the entry with a
//! signed delete; a 404 there is treated as success since the sweeper may
//! already have retired the session. Registration failures are surfaced so
//! the caller can fall back to stand-alone mode.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::time::Duration;

use reqwest::Client;
use reqwest::header::AUTHORIZATION;
use reqwest::header::CONTENT_TYPE;
use secchiware_core::EnvironmentEndpoint;
use secchiware_core::KeyId;
use secchiware_core::RegistrationRequest;
use secchiware_core::Timestamp;
use secchiware_core::signing::RequestSigner;
use secchiware_core::signing::SigningError;
use thiserror::Error;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Errors produced while talking to the C2.
///
/// # Invariants
/// - Variants are stable for programmatic handling.
#[derive(Debug, Error)]
pub enum RegistrationError {
    /// Request signing failed.
    #[error(transparent)]
    Signing(#[from] SigningError),
    /// Request body serialization failed.
    #[error("registration body serialization failed: {0}")]
    Body(String),
    /// HTTP transport failed (timeout, refused connection).
    #[error("c2 unreachable: {0}")]
    Unreachable(String),
    /// The C2 rejected the request.
    #[error("c2 rejected request with status {0}")]
    Rejected(u16),
    /// The HTTP client could not be constructed.
    #[error("http client build failed: {0}")]
    Client(String),
}

// ============================================================================
// SECTION: Client
// ============================================================================

/// Node-signed HTTP client for the C2 registration surface.
///
/// # Invariants
/// - Every request signs `host` and `timestamp`; bodies also sign `digest`.
/// - All requests run under the configured timeout.
pub struct C2Client {
    /// Outbound HTTP client with bounded timeout.
    http: Client,
    /// Base URL of the C2 service.
    base_url: String,
    /// Value signed and transmitted as the `host` header.
    host_header: String,
    /// Node identity signer.
    signer: RequestSigner,
}

impl C2Client {
    /// Builds a client for the configured C2 endpoint.
    ///
    /// # Errors
    ///
    /// Returns [`RegistrationError::Client`] when the HTTP client cannot be
    /// constructed.
    pub fn new(
        c2_host: &str,
        c2_port: u16,
        key_id: KeyId,
        secret: impl Into<Vec<u8>>,
        timeout: Duration,
    ) -> Result<Self, RegistrationError> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| RegistrationError::Client(err.to_string()))?;
        Ok(Self {
            http,
            base_url: format!("http://{c2_host}:{c2_port}"),
            host_header: format!("{c2_host}:{c2_port}"),
            signer: RequestSigner::new(key_id, secret),
        })
    }

    /// Registers the node with the C2.
    ///
    /// # Errors
    ///
    /// Returns [`RegistrationError`] when signing, transport, or the C2's
    /// response indicate failure; callers fall back to stand-alone mode.
    pub async fn register(&self, request: &RegistrationRequest) -> Result<(), RegistrationError> {
        let body = serde_json::to_vec(request)
            .map_err(|err| RegistrationError::Body(err.to_string()))?;
        let signed = self.signer.sign(
            "POST",
            "/environments",
            None,
            &self.host_header,
            &Timestamp::now(),
            Some(&body),
        )?;
        let mut outbound = self
            .http
            .post(format!("{}/environments", self.base_url))
            .header(CONTENT_TYPE, "application/json")
            .body(body);
        for (name, value) in &signed.headers {
            outbound = outbound.header(name, value);
        }
        let response = outbound
            .header(AUTHORIZATION, signed.authorization)
            .send()
            .await
            .map_err(|err| RegistrationError::Unreachable(err.to_string()))?;
        if response.status().is_success() {
            Ok(())
        } else {
            Err(RegistrationError::Rejected(response.status().as_u16()))
        }
    }

    /// Retires the node's registration; an already-missing entry is success.
    ///
    /// # Errors
    ///
    /// Returns [`RegistrationError`] on signing or transport failure, or when
    /// the C2 answers with an unexpected status.
    pub async fn deregister(&self, endpoint: &EnvironmentEndpoint) -> Result<(), RegistrationError> {
        let path = format!("/environments/{}/{}", endpoint.ip, endpoint.port);
        let signed = self.signer.sign(
            "DELETE",
            &path,
            None,
            &self.host_header,
            &Timestamp::now(),
            None,
        )?;
        let mut outbound = self.http.delete(format!("{}{path}", self.base_url));
        for (name, value) in &signed.headers {
            outbound = outbound.header(name, value);
        }
        let response = outbound
            .header(AUTHORIZATION, signed.authorization)
            .send()
            .await
            .map_err(|err| RegistrationError::Unreachable(err.to_string()))?;
        let status = response.status();
        if status.is_success() || status.as_u16() == 404 {
            Ok(())
        } else {
            Err(RegistrationError::Rejected(status.as_u16()))
        }
    }
}
