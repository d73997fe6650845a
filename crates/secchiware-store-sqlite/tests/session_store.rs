//! Session store integration tests for secchiware-store-sqlite.
// crates/secchiware-store-sqlite/tests/session_store.rs
// =============================================================================
// Module: Session Store Integration Tests
// Description: Validate the durable session/execution/report state machine.
// Purpose: Ensure invariants, cascades, and filtered queries hold on SQLite.
// =============================================================================

#![allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    reason = "Test-only assertions."
)]

use secchiware_core::Arrange;
use secchiware_core::EnvironmentEndpoint;
use secchiware_core::ExecutionQuery;
use secchiware_core::PlatformInfo;
use secchiware_core::SessionOrder;
use secchiware_core::SessionQuery;
use secchiware_core::TestReport;
use secchiware_core::Timestamp;
use secchiware_store_sqlite::SqliteSessionStore;
use secchiware_store_sqlite::SqliteStoreError;

fn store() -> SqliteSessionStore {
    SqliteSessionStore::open_in_memory().expect("open store")
}

fn endpoint(ip: &str, port: u16) -> EnvironmentEndpoint {
    EnvironmentEndpoint::new(ip, port)
}

fn stamp(raw: &str) -> Timestamp {
    Timestamp::parse(raw).expect("timestamp")
}

fn sample_report(name: &str) -> TestReport {
    TestReport {
        test_name: name.to_string(),
        test_description: "sample".to_string(),
        result_code: 1,
        timestamp_start: stamp("2024-01-01T00:00:01Z"),
        timestamp_end: stamp("2024-01-01T00:00:02Z"),
        additional_info: Some(TestReport::error_info("context")),
    }
}

#[test]
fn at_most_one_active_session_per_endpoint() {
    let store = store();
    let endpoint = endpoint("10.0.0.2", 4900);
    let platform = PlatformInfo::gather();
    let first = store
        .open_session(&endpoint, &platform, &stamp("2024-01-01T00:00:00Z"))
        .expect("open");
    let conflict = store.open_session(&endpoint, &platform, &stamp("2024-01-01T00:01:00Z"));
    assert!(matches!(conflict, Err(SqliteStoreError::ActiveSession(id)) if id == first));

    store.close_session(first, &stamp("2024-01-01T00:02:00Z")).expect("close");
    assert!(store.find_active(&endpoint).expect("find").is_none());
    let second = store
        .open_session(&endpoint, &platform, &stamp("2024-01-01T00:03:00Z"))
        .expect("reopen");
    assert_ne!(first, second);
}

#[test]
fn close_session_is_idempotent_and_missing_sessions_fail() {
    let store = store();
    let id = store
        .open_session(&endpoint("10.0.0.2", 4900), &PlatformInfo::gather(), &stamp("2024-01-01T00:00:00Z"))
        .expect("open");
    store.close_session(id, &stamp("2024-01-01T00:01:00Z")).expect("close");
    store.close_session(id, &stamp("2024-01-01T00:02:00Z")).expect("close again");
    assert!(matches!(
        store.close_session(id + 100, &stamp("2024-01-01T00:02:00Z")),
        Err(SqliteStoreError::NotFound(_))
    ));
}

#[test]
fn reports_roundtrip_through_session_detail() {
    let store = store();
    let session = store
        .open_session(&endpoint("10.0.0.2", 4900), &PlatformInfo::gather(), &stamp("2024-01-01T00:00:00Z"))
        .expect("open");
    let execution = store
        .open_execution(session, &stamp("2024-01-01T00:00:01Z"))
        .expect("execution");
    let reports = vec![sample_report("p1.m.S.a"), sample_report("p1.m.S.b")];
    store.record_reports(execution, &reports).expect("record");

    let detail = store.session_detail(session).expect("detail").expect("present");
    assert_eq!(detail.session.id, session);
    assert_eq!(detail.executions.len(), 1);
    let stored: Vec<&TestReport> =
        detail.executions[0].reports.iter().map(|record| &record.report).collect();
    assert_eq!(stored.len(), 2);
    assert_eq!(stored[0], &reports[0]);
    assert_eq!(stored[1], &reports[1]);
}

#[test]
fn deleting_finished_session_cascades() {
    let store = store();
    let session = store
        .open_session(&endpoint("10.0.0.2", 4900), &PlatformInfo::gather(), &stamp("2024-01-01T00:00:00Z"))
        .expect("open");
    let execution = store
        .open_execution(session, &stamp("2024-01-01T00:00:01Z"))
        .expect("execution");
    store.record_reports(execution, &[sample_report("p1.m.S.a")]).expect("record");

    assert!(matches!(
        store.delete_session(session),
        Err(SqliteStoreError::ActiveSession(id)) if id == session
    ));
    store.close_session(session, &stamp("2024-01-01T00:05:00Z")).expect("close");
    store.delete_session(session).expect("delete");

    assert!(store.session_detail(session).expect("detail").is_none());
    let executions = store.list_executions(&ExecutionQuery::default()).expect("list");
    assert!(executions.is_empty());
    assert!(matches!(
        store.delete_session(session),
        Err(SqliteStoreError::NotFound(_))
    ));
}

#[test]
fn open_execution_requires_existing_session() {
    let store = store();
    assert!(matches!(
        store.open_execution(42, &stamp("2024-01-01T00:00:00Z")),
        Err(SqliteStoreError::NotFound(_))
    ));
}

#[test]
fn list_sessions_applies_filters_and_ordering() {
    let store = store();
    let platform = PlatformInfo::gather();
    let first = store
        .open_session(&endpoint("10.0.0.1", 4900), &platform, &stamp("2024-01-01T00:00:00Z"))
        .expect("open");
    let second = store
        .open_session(&endpoint("10.0.0.2", 4900), &platform, &stamp("2024-01-02T00:00:00Z"))
        .expect("open");
    let third = store
        .open_session(&endpoint("10.0.0.3", 4901), &platform, &stamp("2024-01-03T00:00:00Z"))
        .expect("open");

    let by_ip = store
        .list_sessions(&SessionQuery {
            ips: vec!["10.0.0.2".to_string()],
            ..SessionQuery::default()
        })
        .expect("list");
    assert_eq!(by_ip.len(), 1);
    assert_eq!(by_ip[0].id, second);

    let by_port = store
        .list_sessions(&SessionQuery {
            ports: vec![4901],
            ..SessionQuery::default()
        })
        .expect("list");
    assert_eq!(by_port.len(), 1);
    assert_eq!(by_port[0].id, third);

    let newest_first = store
        .list_sessions(&SessionQuery {
            order_by: SessionOrder::SessionStart,
            arrange: Arrange::Desc,
            limit: Some(2),
            ..SessionQuery::default()
        })
        .expect("list");
    assert_eq!(newest_first.len(), 2);
    assert_eq!(newest_first[0].id, third);
    assert_eq!(newest_first[1].id, second);

    let window = store
        .list_sessions(&SessionQuery {
            started_after: Some(stamp("2024-01-01T12:00:00Z")),
            started_before: Some(stamp("2024-01-02T12:00:00Z")),
            ..SessionQuery::default()
        })
        .expect("list");
    assert_eq!(window.len(), 1);
    assert_eq!(window[0].id, second);

    let offset = store
        .list_sessions(&SessionQuery {
            offset: 2,
            ..SessionQuery::default()
        })
        .expect("list");
    assert_eq!(offset.len(), 1);
    assert_eq!(offset[0].id, third);
    let _ = first;
}

#[test]
fn list_executions_filters_by_session() {
    let store = store();
    let platform = PlatformInfo::gather();
    let session_a = store
        .open_session(&endpoint("10.0.0.1", 4900), &platform, &stamp("2024-01-01T00:00:00Z"))
        .expect("open");
    let session_b = store
        .open_session(&endpoint("10.0.0.2", 4900), &platform, &stamp("2024-01-01T00:00:00Z"))
        .expect("open");
    store.open_execution(session_a, &stamp("2024-01-01T00:01:00Z")).expect("execution");
    store.open_execution(session_b, &stamp("2024-01-01T00:02:00Z")).expect("execution");
    store.open_execution(session_b, &stamp("2024-01-01T00:03:00Z")).expect("execution");

    let of_b = store
        .list_executions(&ExecutionQuery {
            sessions: vec![session_b],
            ..ExecutionQuery::default()
        })
        .expect("list");
    assert_eq!(of_b.len(), 2);
    assert!(of_b.iter().all(|execution| execution.fk_session == session_b));
}
