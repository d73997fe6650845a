// crates/secchiware-broker/src/tests.rs
// ============================================================================
// Module: Broker Unit Tests
// Description: Unit tests for the in-memory cache/lock broker.
// Purpose: Validate TTL expiry, fencing mutexes, and counter semantics.
// Dependencies: secchiware-broker
// ============================================================================

//! ## Overview
//! Exercises the broker contract: value TTLs, prefix listings, mutex fencing,
//! and replay counter windows.

// ============================================================================
// SECTION: Lint Configuration
// ============================================================================

#![allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    reason = "Test-only assertions."
)]

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::time::Duration;

use secchiware_core::CacheBroker;
use serde_json::json;

use crate::MemoryBroker;

// ============================================================================
// SECTION: Values
// ============================================================================

#[test]
fn set_get_delete_roundtrip() {
    let broker = MemoryBroker::new();
    broker.set("active:10.0.0.2:4900", json!({"session_id": 1}), None).expect("set");
    let value = broker.get("active:10.0.0.2:4900").expect("get").expect("present");
    assert_eq!(value["session_id"], 1);
    assert!(broker.delete("active:10.0.0.2:4900").expect("delete"));
    assert!(broker.get("active:10.0.0.2:4900").expect("get").is_none());
    assert!(!broker.delete("active:10.0.0.2:4900").expect("delete"));
}

#[test]
fn expired_values_are_not_observable() {
    let broker = MemoryBroker::new();
    broker.set("ephemeral", json!(1), Some(Duration::ZERO)).expect("set");
    assert!(broker.get("ephemeral").expect("get").is_none());
    assert!(broker.keys("ephem").expect("keys").is_empty());
}

#[test]
fn keys_filters_by_prefix() {
    let broker = MemoryBroker::new();
    broker.set("active:a:1", json!(1), None).expect("set");
    broker.set("active:b:2", json!(2), None).expect("set");
    broker.set("nonce:x", json!(3), None).expect("set");
    let keys = broker.keys("active:").expect("keys");
    assert_eq!(keys, vec!["active:a:1".to_string(), "active:b:2".to_string()]);
}

// ============================================================================
// SECTION: Mutexes
// ============================================================================

#[test]
fn acquire_is_exclusive_until_release() {
    let broker = MemoryBroker::new();
    let ttl = Duration::from_secs(30);
    let token = broker.acquire("env:10.0.0.2:4900", ttl).expect("acquire").expect("token");
    assert!(broker.acquire("env:10.0.0.2:4900", ttl).expect("acquire").is_none());
    assert!(broker.release("env:10.0.0.2:4900", token).expect("release"));
    assert!(broker.acquire("env:10.0.0.2:4900", ttl).expect("acquire").is_some());
}

#[test]
fn release_with_stale_token_is_rejected() {
    let broker = MemoryBroker::new();
    let ttl = Duration::ZERO;
    let stale = broker.acquire("repo:p1", ttl).expect("acquire").expect("token");
    // Lease expired; a second holder acquires with a newer token.
    let fresh = broker.acquire("repo:p1", Duration::from_secs(30)).expect("acquire").expect("token");
    assert!(fresh > stale);
    assert!(!broker.release("repo:p1", stale).expect("release"));
    assert!(broker.release("repo:p1", fresh).expect("release"));
}

#[test]
fn tokens_increase_across_expiries() {
    let broker = MemoryBroker::new();
    let first = broker.acquire("lock", Duration::ZERO).expect("acquire").expect("token");
    let second = broker.acquire("lock", Duration::ZERO).expect("acquire").expect("token");
    let third = broker.acquire("lock", Duration::ZERO).expect("acquire").expect("token");
    assert!(first < second && second < third);
}

// ============================================================================
// SECTION: Counters
// ============================================================================

#[test]
fn incr_counts_within_window() {
    let broker = MemoryBroker::new();
    let window = Duration::from_secs(600);
    assert_eq!(broker.incr("nonce:sig", window).expect("incr"), 1);
    assert_eq!(broker.incr("nonce:sig", window).expect("incr"), 2);
    assert_eq!(broker.incr("nonce:other", window).expect("incr"), 1);
}

#[test]
fn incr_resets_after_expiry() {
    let broker = MemoryBroker::new();
    assert_eq!(broker.incr("nonce:sig", Duration::ZERO).expect("incr"), 1);
    assert_eq!(broker.incr("nonce:sig", Duration::from_secs(600)).expect("incr"), 1);
}
