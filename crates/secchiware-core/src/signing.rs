// crates/secchiware-core/src/signing.rs
// ============================================================================
// Module: Secchiware Request Signing
// Description: SECCHIWARE-HMAC-256 canonicalization, signing, and verification.
// Purpose: Authenticate every cross-principal request bit-exactly.
// Dependencies: hmac, sha2, subtle, base64, time, thiserror
// ============================================================================

//! ## Overview
//! This module implements the `SECCHIWARE-HMAC-256` authentication scheme
//! shared by Clients, the C2, and Nodes. The canonical request string is a
//! pure function of method, path, query, and the signed header list; the
//! signature is HMAC-SHA256 over that string with the pair's shared secret.
//! Invariants:
//! - The canonical string is bit-exact across implementations: lowercased
//!   method, path without query, the query line omitted entirely when absent,
//!   and `lowercase(name): value` lines with no trailing newline.
//! - Verification compares signatures in constant time.
//! - Requests with bodies always carry and sign a `digest` header.
//!
//! Security posture: every inbound header is untrusted input; verification
//! fails closed on any malformed or missing component.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use hmac::Hmac;
use hmac::Mac;
use sha2::Digest;
use sha2::Sha256;
use subtle::ConstantTimeEq;
use thiserror::Error;

use crate::core::identifiers::KeyId;
use crate::core::time::TimeError;
use crate::core::time::Timestamp;
use crate::interfaces::CacheBroker;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Authentication scheme label carried in `Authorization` headers.
pub const SCHEME: &str = "SECCHIWARE-HMAC-256";
/// Name of the host header in the signed set.
pub const HEADER_HOST: &str = "host";
/// Name of the freshness header in the signed set.
pub const HEADER_TIMESTAMP: &str = "timestamp";
/// Name of the body digest header in the signed set.
pub const HEADER_DIGEST: &str = "digest";
/// Value prefix of the body digest header.
pub const DIGEST_PREFIX: &str = "sha-256=";
/// Signed header set assumed when the header omits `headers=`.
pub const DEFAULT_SIGNED_HEADERS: [&str; 2] = [HEADER_HOST, HEADER_TIMESTAMP];
/// Default freshness skew window in seconds (±).
pub const DEFAULT_SKEW_SECS: u64 = 300;

/// HMAC-SHA256 instantiation used by the scheme.
type HmacSha256 = Hmac<Sha256>;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Errors produced while building signed requests.
///
/// # Invariants
/// - Variants are stable for programmatic handling.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SigningError {
    /// The shared secret was rejected by the MAC primitive.
    #[error("signing key rejected: {0}")]
    Key(String),
    /// Timestamp formatting failed.
    #[error(transparent)]
    Time(#[from] TimeError),
}

/// Errors produced while verifying signed requests.
///
/// # Invariants
/// - `Malformed` maps to HTTP 400; `Broker` maps to HTTP 500; every other
///   variant maps to HTTP 401 with a `WWW-Authenticate` challenge.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum VerifyError {
    /// The `Authorization` header was absent.
    #[error("missing authorization header")]
    MissingAuthorization,
    /// The `Authorization` header did not parse.
    #[error("malformed authorization header: {0}")]
    Malformed(String),
    /// The `keyId` is not known to the verifier.
    #[error("unknown keyId: {0}")]
    UnknownKeyId(String),
    /// A mandatory header name was missing from the signed set.
    #[error("signed header set must include {0}")]
    UnsignedRequiredHeader(&'static str),
    /// A signed header was not present on the request.
    #[error("signed header not present: {0}")]
    HeaderNotPresent(String),
    /// The freshness header was unparseable or outside the skew window.
    #[error("stale or invalid timestamp: {0}")]
    StaleTimestamp(String),
    /// The request body digest did not match the `digest` header.
    #[error("body digest mismatch")]
    DigestMismatch,
    /// The signature did not match the canonical string.
    #[error("signature mismatch")]
    SignatureMismatch,
    /// The signature was already accepted within the freshness window.
    #[error("request replayed")]
    Replayed,
    /// The replay-prevention broker failed.
    #[error("broker failure: {0}")]
    Broker(String),
}

impl VerifyError {
    /// Returns true when the failure is a client-side malformation (HTTP 400).
    #[must_use]
    pub const fn is_malformed(&self) -> bool {
        matches!(self, Self::Malformed(_))
    }

    /// Returns true when the failure is internal to the verifier (HTTP 500).
    #[must_use]
    pub const fn is_internal(&self) -> bool {
        matches!(self, Self::Broker(_))
    }
}

// ============================================================================
// SECTION: Canonicalization
// ============================================================================

/// Percent-encodes spaces in a raw query string.
///
/// The rest of the query is carried verbatim: both signer and verifier apply
/// the same transformation to the same raw string, so round-trip stability is
/// all that matters.
#[must_use]
pub fn encode_query(raw: &str) -> String {
    raw.replace(' ', "%20")
}

/// Builds the canonical request string.
///
/// Layout: lowercased method, newline, path, newline, encoded query plus
/// newline when a query is present, then `lowercase(name): value` lines for
/// each signed header with no trailing newline after the last.
#[must_use]
pub fn canonical_string(
    method: &str,
    path: &str,
    query: Option<&str>,
    signed_headers: &[(String, String)],
) -> String {
    let mut canonical = String::new();
    canonical.push_str(&method.to_ascii_lowercase());
    canonical.push('\n');
    canonical.push_str(path);
    canonical.push('\n');
    if let Some(raw) = query {
        canonical.push_str(&encode_query(raw));
        canonical.push('\n');
    }
    let mut first = true;
    for (name, value) in signed_headers {
        if !first {
            canonical.push('\n');
        }
        first = false;
        canonical.push_str(&name.to_ascii_lowercase());
        canonical.push_str(": ");
        canonical.push_str(value);
    }
    canonical
}

/// Computes the `Digest` header value for a request body.
#[must_use]
pub fn body_digest(body: &[u8]) -> String {
    let digest = Sha256::digest(body);
    format!("{DIGEST_PREFIX}{}", BASE64.encode(digest))
}

/// Computes the base64 HMAC-SHA256 signature of a canonical string.
///
/// # Errors
///
/// Returns [`SigningError::Key`] when the MAC primitive rejects the secret.
pub fn compute_signature(secret: &[u8], canonical: &str) -> Result<String, SigningError> {
    let mut mac =
        HmacSha256::new_from_slice(secret).map_err(|err| SigningError::Key(err.to_string()))?;
    mac.update(canonical.as_bytes());
    Ok(BASE64.encode(mac.finalize().into_bytes()))
}

// ============================================================================
// SECTION: Authorization Header
// ============================================================================

/// Parsed `SECCHIWARE-HMAC-256` authorization header.
///
/// # Invariants
/// - `signed_headers` names are lowercased at parse time.
/// - `signature` is carried as the transmitted base64 text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorizationHeader {
    /// Signing principal identifier.
    pub key_id: KeyId,
    /// Ordered signed header names; empty means the default set.
    pub signed_headers: Vec<String>,
    /// Base64 signature text.
    pub signature: String,
}

impl AuthorizationHeader {
    /// Parses an `Authorization` header value.
    ///
    /// # Errors
    ///
    /// Returns [`VerifyError::Malformed`] on any structural violation.
    pub fn parse(value: &str) -> Result<Self, VerifyError> {
        let rest = value
            .strip_prefix(SCHEME)
            .ok_or_else(|| VerifyError::Malformed("unexpected scheme".to_string()))?;
        let rest = rest
            .strip_prefix(' ')
            .ok_or_else(|| VerifyError::Malformed("missing parameter list".to_string()))?;
        let mut key_id: Option<String> = None;
        let mut signed_headers: Vec<String> = Vec::new();
        let mut signature: Option<String> = None;
        for pair in rest.split(',') {
            let (name, parameter) = pair
                .split_once('=')
                .ok_or_else(|| VerifyError::Malformed(format!("bad parameter: {pair}")))?;
            match name {
                "keyId" => {
                    if parameter.is_empty() {
                        return Err(VerifyError::Malformed("empty keyId".to_string()));
                    }
                    key_id = Some(parameter.to_string());
                }
                "headers" => {
                    signed_headers = parameter
                        .split(';')
                        .filter(|entry| !entry.is_empty())
                        .map(str::to_ascii_lowercase)
                        .collect();
                    if signed_headers.is_empty() {
                        return Err(VerifyError::Malformed("empty headers list".to_string()));
                    }
                }
                "signature" => {
                    if parameter.is_empty() {
                        return Err(VerifyError::Malformed("empty signature".to_string()));
                    }
                    signature = Some(parameter.to_string());
                }
                other => {
                    return Err(VerifyError::Malformed(format!("unknown parameter: {other}")));
                }
            }
        }
        let key_id = key_id.ok_or_else(|| VerifyError::Malformed("missing keyId".to_string()))?;
        let signature =
            signature.ok_or_else(|| VerifyError::Malformed("missing signature".to_string()))?;
        Ok(Self {
            key_id: KeyId::new(key_id),
            signed_headers,
            signature,
        })
    }

    /// Formats the header value for transmission.
    #[must_use]
    pub fn format(&self) -> String {
        if self.signed_headers.is_empty() {
            format!("{SCHEME} keyId={},signature={}", self.key_id, self.signature)
        } else {
            format!(
                "{SCHEME} keyId={},headers={},signature={}",
                self.key_id,
                self.signed_headers.join(";"),
                self.signature
            )
        }
    }

    /// Returns the effective signed header names.
    #[must_use]
    pub fn effective_signed_headers(&self) -> Vec<String> {
        if self.signed_headers.is_empty() {
            DEFAULT_SIGNED_HEADERS.iter().map(|name| (*name).to_string()).collect()
        } else {
            self.signed_headers.clone()
        }
    }
}

// ============================================================================
// SECTION: Request Signer
// ============================================================================

/// Headers and authorization value for one outbound signed request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedHeaders {
    /// Headers to set on the request, in signed order.
    pub headers: Vec<(String, String)>,
    /// `Authorization` header value.
    pub authorization: String,
}

/// Signs outbound requests for one principal.
///
/// # Invariants
/// - Every produced request signs at least `host` and `timestamp`.
/// - Requests with bodies also sign a `digest` header.
pub struct RequestSigner {
    /// Principal identifier placed in `keyId`.
    key_id: KeyId,
    /// Shared secret for the communicating pair.
    secret: Vec<u8>,
}

impl RequestSigner {
    /// Creates a signer for a principal and shared secret.
    #[must_use]
    pub fn new(key_id: KeyId, secret: impl Into<Vec<u8>>) -> Self {
        Self {
            key_id,
            secret: secret.into(),
        }
    }

    /// Returns the signing principal identifier.
    #[must_use]
    pub const fn key_id(&self) -> &KeyId {
        &self.key_id
    }

    /// Builds the signed headers for an outbound request.
    ///
    /// # Errors
    ///
    /// Returns [`SigningError`] when the timestamp cannot be formatted or the
    /// secret is rejected.
    pub fn sign(
        &self,
        method: &str,
        path: &str,
        query: Option<&str>,
        host: &str,
        now: &Timestamp,
        body: Option<&[u8]>,
    ) -> Result<SignedHeaders, SigningError> {
        let mut headers: Vec<(String, String)> = vec![
            (HEADER_HOST.to_string(), host.to_string()),
            (HEADER_TIMESTAMP.to_string(), now.to_rfc3339()?),
        ];
        if let Some(body) = body {
            headers.push((HEADER_DIGEST.to_string(), body_digest(body)));
        }
        let canonical = canonical_string(method, path, query, &headers);
        let signature = compute_signature(&self.secret, &canonical)?;
        let authorization = AuthorizationHeader {
            key_id: self.key_id.clone(),
            signed_headers: headers.iter().map(|(name, _)| name.clone()).collect(),
            signature,
        };
        Ok(SignedHeaders {
            headers,
            authorization: authorization.format(),
        })
    }
}

// ============================================================================
// SECTION: Secret Directory
// ============================================================================

/// Lookup of shared secrets by key identifier.
pub trait SecretDirectory: Send + Sync {
    /// Returns the shared secret for a principal, when known.
    fn secret(&self, key_id: &KeyId) -> Option<Vec<u8>>;
}

/// Static in-memory secret directory.
///
/// # Invariants
/// - Lookups are exact matches on the key identifier text.
#[derive(Debug, Clone, Default)]
pub struct StaticSecrets {
    /// Secrets keyed by principal identifier.
    secrets: BTreeMap<String, Vec<u8>>,
}

impl StaticSecrets {
    /// Creates an empty directory.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a secret for a principal.
    #[must_use]
    pub fn with_secret(mut self, key_id: impl Into<String>, secret: impl Into<Vec<u8>>) -> Self {
        self.secrets.insert(key_id.into(), secret.into());
        self
    }
}

impl SecretDirectory for StaticSecrets {
    fn secret(&self, key_id: &KeyId) -> Option<Vec<u8>> {
        self.secrets.get(key_id.as_str()).cloned()
    }
}

// ============================================================================
// SECTION: Verifier
// ============================================================================

/// Inbound request view handed to the verifier.
///
/// # Invariants
/// - `headers` maps lowercased header names to transmitted values.
/// - `body` is `None` for bodiless requests.
#[derive(Debug, Clone)]
pub struct InboundRequest<'a> {
    /// HTTP method as transmitted.
    pub method: &'a str,
    /// Request path without the query string.
    pub path: &'a str,
    /// Raw query string, when present.
    pub query: Option<&'a str>,
    /// Lowercased header name to value map.
    pub headers: &'a BTreeMap<String, String>,
    /// Raw request body bytes, when present.
    pub body: Option<&'a [u8]>,
}

/// Verifies inbound `SECCHIWARE-HMAC-256` requests.
///
/// # Invariants
/// - Signature comparison is constant-time.
/// - Replay tracking scopes nonces to twice the skew window.
pub struct Verifier<'a> {
    /// Secret lookup for the accepted principals.
    pub secrets: &'a dyn SecretDirectory,
    /// Broker used for replay-prevention counters.
    pub broker: &'a dyn CacheBroker,
    /// Maximum accepted distance between the request timestamp and `now`.
    pub skew: Duration,
    /// Verifier wall-clock reference.
    pub now: Timestamp,
}

impl Verifier<'_> {
    /// Verifies a request and returns the authenticated principal.
    ///
    /// # Errors
    ///
    /// Returns [`VerifyError`] naming the first failed check; callers map
    /// `Malformed` to 400, `Broker` to 500, and everything else to 401.
    pub fn verify(&self, request: &InboundRequest<'_>) -> Result<KeyId, VerifyError> {
        let raw = request
            .headers
            .get("authorization")
            .ok_or(VerifyError::MissingAuthorization)?;
        let header = AuthorizationHeader::parse(raw)?;
        let secret = self
            .secrets
            .secret(&header.key_id)
            .ok_or_else(|| VerifyError::UnknownKeyId(header.key_id.to_string()))?;

        let signed_names = header.effective_signed_headers();
        for required in [HEADER_HOST, HEADER_TIMESTAMP] {
            if !signed_names.iter().any(|name| name == required) {
                return Err(VerifyError::UnsignedRequiredHeader(required));
            }
        }
        let has_body = request.body.is_some_and(|body| !body.is_empty());
        if has_body && !signed_names.iter().any(|name| name == HEADER_DIGEST) {
            return Err(VerifyError::UnsignedRequiredHeader(HEADER_DIGEST));
        }

        let mut signed_headers = Vec::with_capacity(signed_names.len());
        for name in &signed_names {
            let value = request
                .headers
                .get(name)
                .ok_or_else(|| VerifyError::HeaderNotPresent(name.clone()))?;
            signed_headers.push((name.clone(), value.clone()));
        }

        self.check_freshness(request.headers)?;
        if let Some(body) = request.body
            && !body.is_empty()
        {
            check_digest(request.headers, body)?;
        }

        let canonical =
            canonical_string(request.method, request.path, request.query, &signed_headers);
        let expected = compute_signature(&secret, &canonical)
            .map_err(|err| VerifyError::Malformed(err.to_string()))?;
        let matches: bool =
            expected.as_bytes().ct_eq(header.signature.as_bytes()).into();
        if !matches {
            return Err(VerifyError::SignatureMismatch);
        }

        self.check_replay(&header)?;
        Ok(header.key_id)
    }

    /// Validates the freshness header against the skew window.
    fn check_freshness(&self, headers: &BTreeMap<String, String>) -> Result<(), VerifyError> {
        let raw = headers
            .get(HEADER_TIMESTAMP)
            .ok_or_else(|| VerifyError::HeaderNotPresent(HEADER_TIMESTAMP.to_string()))?;
        let stamp =
            Timestamp::parse(raw).map_err(|err| VerifyError::StaleTimestamp(err.to_string()))?;
        let distance = self.now.abs_difference(&stamp);
        let skew = time::Duration::try_from(self.skew)
            .map_err(|err| VerifyError::Broker(err.to_string()))?;
        if distance > skew {
            return Err(VerifyError::StaleTimestamp(format!(
                "timestamp {raw} outside ±{}s window",
                self.skew.as_secs()
            )));
        }
        Ok(())
    }

    /// Rejects signatures already observed within the replay window.
    fn check_replay(&self, header: &AuthorizationHeader) -> Result<(), VerifyError> {
        let nonce_key = format!("secchiware:nonce:{}:{}", header.key_id, header.signature);
        let window = self
            .skew
            .checked_mul(2)
            .unwrap_or(self.skew);
        let count = self
            .broker
            .incr(&nonce_key, window)
            .map_err(|err| VerifyError::Broker(err.to_string()))?;
        if count > 1 {
            return Err(VerifyError::Replayed);
        }
        Ok(())
    }
}

/// Recomputes and compares the body digest byte-for-byte.
fn check_digest(headers: &BTreeMap<String, String>, body: &[u8]) -> Result<(), VerifyError> {
    let transmitted = headers
        .get(HEADER_DIGEST)
        .ok_or_else(|| VerifyError::HeaderNotPresent(HEADER_DIGEST.to_string()))?;
    if transmitted != &body_digest(body) {
        return Err(VerifyError::DigestMismatch);
    }
    Ok(())
}

#[cfg(test)]
mod tests;
