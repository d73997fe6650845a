// crates/secchiware-core/src/signing/tests.rs
// ============================================================================
// Module: Signing Unit Tests
// Description: Unit tests for canonicalization, signing, and verification.
// Purpose: Validate the scheme bit-exactly against fixed vectors.
// Dependencies: secchiware-core
// ============================================================================

//! ## Overview
//! Exercises the canonical-string layout against the reference vector, the
//! sign/verify round trip, and every verifier rejection path.

// ============================================================================
// SECTION: Lint Configuration
// ============================================================================

#![allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    reason = "Test-only assertions."
)]

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::sync::Mutex;
use std::time::Duration;

use proptest::prelude::*;
use serde_json::Value;

use super::AuthorizationHeader;
use super::InboundRequest;
use super::RequestSigner;
use super::SCHEME;
use super::StaticSecrets;
use super::Verifier;
use super::VerifyError;
use super::body_digest;
use super::canonical_string;
use super::compute_signature;
use crate::core::identifiers::KeyId;
use crate::core::time::Timestamp;
use crate::interfaces::BrokerError;
use crate::interfaces::CacheBroker;
use crate::interfaces::FencingToken;

// ============================================================================
// SECTION: Fixtures
// ============================================================================

/// Counter-only broker stub for replay tracking.
#[derive(Default)]
struct CounterBroker {
    counters: Mutex<BTreeMap<String, u64>>,
}

impl CacheBroker for CounterBroker {
    fn get(&self, _key: &str) -> Result<Option<Value>, BrokerError> {
        Ok(None)
    }

    fn set(&self, _key: &str, _value: Value, _ttl: Option<Duration>) -> Result<(), BrokerError> {
        Ok(())
    }

    fn delete(&self, _key: &str) -> Result<bool, BrokerError> {
        Ok(false)
    }

    fn keys(&self, _prefix: &str) -> Result<Vec<String>, BrokerError> {
        Ok(Vec::new())
    }

    fn acquire(&self, _name: &str, _ttl: Duration) -> Result<Option<FencingToken>, BrokerError> {
        Ok(Some(FencingToken::new(1)))
    }

    fn release(&self, _name: &str, _token: FencingToken) -> Result<bool, BrokerError> {
        Ok(true)
    }

    fn incr(&self, key: &str, _ttl: Duration) -> Result<u64, BrokerError> {
        let mut counters = self.counters.lock().expect("counter lock");
        let entry = counters.entry(key.to_string()).or_insert(0);
        *entry += 1;
        Ok(*entry)
    }
}

fn header_map(pairs: &[(&str, String)]) -> BTreeMap<String, String> {
    pairs.iter().map(|(name, value)| ((*name).to_string(), value.clone())).collect()
}

fn signed_request_headers(
    signer: &RequestSigner,
    method: &str,
    path: &str,
    query: Option<&str>,
    now: &Timestamp,
    body: Option<&[u8]>,
) -> BTreeMap<String, String> {
    let signed = signer.sign(method, path, query, "node:4900", now, body).expect("sign");
    let mut headers: BTreeMap<String, String> =
        signed.headers.iter().cloned().collect();
    headers.insert("authorization".to_string(), signed.authorization);
    headers
}

// ============================================================================
// SECTION: Canonicalization
// ============================================================================

#[test]
fn canonical_matches_reference_vector() {
    let headers = vec![
        ("host".to_string(), "node:4900".to_string()),
        ("timestamp".to_string(), "2024-01-01T00:00:00Z".to_string()),
    ];
    let canonical =
        canonical_string("GET", "/reports", Some("packages=pkg_a,pkg_b"), &headers);
    assert_eq!(
        canonical,
        "get\n/reports\npackages=pkg_a,pkg_b\nhost: node:4900\ntimestamp: 2024-01-01T00:00:00Z"
    );
}

#[test]
fn canonical_omits_query_line_when_absent() {
    let headers = vec![("host".to_string(), "node:4900".to_string())];
    let canonical = canonical_string("GET", "/test_sets", None, &headers);
    assert_eq!(canonical, "get\n/test_sets\nhost: node:4900");
}

#[test]
fn canonical_encodes_spaces_in_query() {
    let canonical = canonical_string("GET", "/reports", Some("tests=a b"), &[]);
    assert!(canonical.contains("tests=a%20b"));
}

#[test]
fn reference_vector_signature_verifies() {
    let headers = vec![
        ("host".to_string(), "node:4900".to_string()),
        ("timestamp".to_string(), "2024-01-01T00:00:00Z".to_string()),
    ];
    let canonical =
        canonical_string("GET", "/reports", Some("packages=pkg_a,pkg_b"), &headers);
    let first = compute_signature(b"sekret", &canonical).expect("signature");
    let second = compute_signature(b"sekret", &canonical).expect("signature");
    assert_eq!(first, second);
    let flipped = canonical.replace("pkg_a", "pkg_x");
    let third = compute_signature(b"sekret", &flipped).expect("signature");
    assert_ne!(first, third);
}

// ============================================================================
// SECTION: Authorization Header
// ============================================================================

#[test]
fn authorization_header_roundtrip() {
    let header = AuthorizationHeader {
        key_id: KeyId::new("Node1"),
        signed_headers: vec!["host".to_string(), "timestamp".to_string(), "digest".to_string()],
        signature: "c2lnbmF0dXJl".to_string(),
    };
    let parsed = AuthorizationHeader::parse(&header.format()).expect("parse");
    assert_eq!(parsed, header);
}

#[test]
fn authorization_header_defaults_signed_set() {
    let raw = format!("{SCHEME} keyId=C2,signature=YWJj");
    let parsed = AuthorizationHeader::parse(&raw).expect("parse");
    assert!(parsed.signed_headers.is_empty());
    assert_eq!(parsed.effective_signed_headers(), vec!["host", "timestamp"]);
}

#[test]
fn authorization_header_rejects_malformations() {
    for raw in [
        "OTHER-SCHEME keyId=a,signature=b",
        "SECCHIWARE-HMAC-256",
        "SECCHIWARE-HMAC-256 keyId=a",
        "SECCHIWARE-HMAC-256 signature=b",
        "SECCHIWARE-HMAC-256 keyId=,signature=b",
        "SECCHIWARE-HMAC-256 keyId=a,headers=,signature=b",
        "SECCHIWARE-HMAC-256 keyId=a,unknown=x,signature=b",
        "SECCHIWARE-HMAC-256 keyId=a,noequals,signature=b",
    ] {
        let result = AuthorizationHeader::parse(raw);
        assert!(
            matches!(result, Err(VerifyError::Malformed(_))),
            "expected malformed for {raw}"
        );
    }
}

// ============================================================================
// SECTION: Verification
// ============================================================================

#[test]
fn sign_then_verify_succeeds() {
    let signer = RequestSigner::new(KeyId::new("C2"), b"sekret".to_vec());
    let now = Timestamp::parse("2024-01-01T00:00:00Z").expect("parse");
    let headers =
        signed_request_headers(&signer, "GET", "/reports", Some("packages=pkg_a"), &now, None);
    let secrets = StaticSecrets::new().with_secret("C2", b"sekret".to_vec());
    let broker = CounterBroker::default();
    let verifier = Verifier {
        secrets: &secrets,
        broker: &broker,
        skew: Duration::from_secs(300),
        now,
    };
    let request = InboundRequest {
        method: "GET",
        path: "/reports",
        query: Some("packages=pkg_a"),
        headers: &headers,
        body: None,
    };
    let key = verifier.verify(&request).expect("verify");
    assert_eq!(key, KeyId::new("C2"));
}

#[test]
fn verify_rejects_any_mutation() {
    let signer = RequestSigner::new(KeyId::new("C2"), b"sekret".to_vec());
    let now = Timestamp::parse("2024-01-01T00:00:00Z").expect("parse");
    let body = b"{\"probe\":true}".to_vec();
    let headers = signed_request_headers(
        &signer,
        "PATCH",
        "/test_sets",
        None,
        &now,
        Some(body.as_slice()),
    );
    let secrets = StaticSecrets::new().with_secret("C2", b"sekret".to_vec());

    let verify = |method: &str, path: &str, query: Option<&str>, headers: &BTreeMap<String, String>, body: &[u8]| {
        let broker = CounterBroker::default();
        let verifier = Verifier {
            secrets: &secrets,
            broker: &broker,
            skew: Duration::from_secs(300),
            now,
        };
        verifier.verify(&InboundRequest {
            method,
            path,
            query,
            headers,
            body: Some(body),
        })
    };

    assert!(verify("PATCH", "/test_sets", None, &headers, &body).is_ok());
    assert!(matches!(
        verify("PUT", "/test_sets", None, &headers, &body),
        Err(VerifyError::SignatureMismatch)
    ));
    assert!(matches!(
        verify("PATCH", "/test_set", None, &headers, &body),
        Err(VerifyError::SignatureMismatch)
    ));
    assert!(matches!(
        verify("PATCH", "/test_sets", Some("extra=1"), &headers, &body),
        Err(VerifyError::SignatureMismatch)
    ));

    let mut tampered_headers = headers.clone();
    tampered_headers.insert("host".to_string(), "evil:4900".to_string());
    assert!(matches!(
        verify("PATCH", "/test_sets", None, &tampered_headers, &body),
        Err(VerifyError::SignatureMismatch)
    ));

    let mut tampered_body = body.clone();
    tampered_body[0] = b'[';
    assert!(matches!(
        verify("PATCH", "/test_sets", None, &headers, &tampered_body),
        Err(VerifyError::DigestMismatch)
    ));
}

#[test]
fn verify_rejects_unknown_key() {
    let signer = RequestSigner::new(KeyId::new("Ghost"), b"sekret".to_vec());
    let now = Timestamp::parse("2024-01-01T00:00:00Z").expect("parse");
    let headers = signed_request_headers(&signer, "GET", "/test_sets", None, &now, None);
    let secrets = StaticSecrets::new().with_secret("C2", b"sekret".to_vec());
    let broker = CounterBroker::default();
    let verifier = Verifier {
        secrets: &secrets,
        broker: &broker,
        skew: Duration::from_secs(300),
        now,
    };
    let result = verifier.verify(&InboundRequest {
        method: "GET",
        path: "/test_sets",
        query: None,
        headers: &headers,
        body: None,
    });
    assert!(matches!(result, Err(VerifyError::UnknownKeyId(_))));
}

#[test]
fn verify_rejects_stale_timestamp() {
    let signer = RequestSigner::new(KeyId::new("C2"), b"sekret".to_vec());
    let signed_at = Timestamp::parse("2024-01-01T00:00:00Z").expect("parse");
    let verified_at = Timestamp::parse("2024-01-01T00:06:00Z").expect("parse");
    let headers = signed_request_headers(&signer, "GET", "/test_sets", None, &signed_at, None);
    let secrets = StaticSecrets::new().with_secret("C2", b"sekret".to_vec());
    let broker = CounterBroker::default();
    let verifier = Verifier {
        secrets: &secrets,
        broker: &broker,
        skew: Duration::from_secs(300),
        now: verified_at,
    };
    let result = verifier.verify(&InboundRequest {
        method: "GET",
        path: "/test_sets",
        query: None,
        headers: &headers,
        body: None,
    });
    assert!(matches!(result, Err(VerifyError::StaleTimestamp(_))));
}

#[test]
fn verify_rejects_replay_within_window() {
    let signer = RequestSigner::new(KeyId::new("Node1"), b"sekret".to_vec());
    let now = Timestamp::parse("2024-01-01T00:00:00Z").expect("parse");
    let headers = signed_request_headers(&signer, "GET", "/test_sets", None, &now, None);
    let secrets = StaticSecrets::new().with_secret("Node1", b"sekret".to_vec());
    let broker = CounterBroker::default();
    let verifier = Verifier {
        secrets: &secrets,
        broker: &broker,
        skew: Duration::from_secs(300),
        now,
    };
    let request = InboundRequest {
        method: "GET",
        path: "/test_sets",
        query: None,
        headers: &headers,
        body: None,
    };
    assert!(verifier.verify(&request).is_ok());
    assert!(matches!(verifier.verify(&request), Err(VerifyError::Replayed)));
}

#[test]
fn verify_requires_digest_for_bodies() {
    let now = Timestamp::parse("2024-01-01T00:00:00Z").expect("parse");
    let body = b"payload".to_vec();
    // Hand-build a signature over host+timestamp only, omitting the digest.
    let signed_headers = vec![
        ("host".to_string(), "node:4900".to_string()),
        ("timestamp".to_string(), "2024-01-01T00:00:00Z".to_string()),
    ];
    let canonical = canonical_string("PATCH", "/test_sets", None, &signed_headers);
    let signature = compute_signature(b"sekret", &canonical).expect("signature");
    let authorization = AuthorizationHeader {
        key_id: KeyId::new("C2"),
        signed_headers: vec!["host".to_string(), "timestamp".to_string()],
        signature,
    };
    let headers = header_map(&[
        ("host", "node:4900".to_string()),
        ("timestamp", "2024-01-01T00:00:00Z".to_string()),
        ("authorization", authorization.format()),
    ]);
    let secrets = StaticSecrets::new().with_secret("C2", b"sekret".to_vec());
    let broker = CounterBroker::default();
    let verifier = Verifier {
        secrets: &secrets,
        broker: &broker,
        skew: Duration::from_secs(300),
        now,
    };
    let result = verifier.verify(&InboundRequest {
        method: "PATCH",
        path: "/test_sets",
        query: None,
        headers: &headers,
        body: Some(&body),
    });
    assert!(matches!(result, Err(VerifyError::UnsignedRequiredHeader("digest"))));
}

#[test]
fn digest_value_uses_sha256_prefix() {
    let digest = body_digest(b"");
    assert!(digest.starts_with("sha-256="));
    assert_eq!(digest, "sha-256=47DEQpj8HBSa+/TImW+5JCeuQeRkm5NMpJWZG3hSuFU=");
}

// ============================================================================
// SECTION: Properties
// ============================================================================

proptest! {
    #[test]
    fn canonical_string_is_pure(
        method in "[A-Za-z]{3,7}",
        path in "/[a-z_/]{0,24}",
        query in proptest::option::of("[a-z_=&,]{0,16}"),
        value in "[ -~]{0,16}",
    ) {
        let headers = vec![
            ("Host".to_string(), value.clone()),
            ("timestamp".to_string(), "2024-01-01T00:00:00Z".to_string()),
        ];
        let first = canonical_string(&method, &path, query.as_deref(), &headers);
        let second = canonical_string(&method, &path, query.as_deref(), &headers);
        assert_eq!(first, second);
        assert!(!first.ends_with('\n'));
        assert!(first.starts_with(&method.to_ascii_lowercase()));
    }
}
