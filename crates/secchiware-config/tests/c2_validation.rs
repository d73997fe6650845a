//! C2 config validation tests for secchiware-config.
// crates/secchiware-config/tests/c2_validation.rs
// =============================================================================
// Module: C2 Config Validation Tests
// Description: Validate key directories, origin lists, and sweeper settings.
// Purpose: Ensure C2 settings fail closed before any socket binds.
// =============================================================================

#![allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    reason = "Test-only assertions."
)]

use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;

use secchiware_config::C2Config;
use secchiware_config::ConfigError;
use secchiware_config::LivenessConfig;
use tempfile::TempDir;

type TestResult = Result<(), String>;

fn minimal_config() -> C2Config {
    C2Config {
        listen_ip: "0.0.0.0".to_string(),
        listen_port: 5000,
        database_path: PathBuf::from("/var/lib/secchiware/c2.db"),
        repository_root: PathBuf::from("/var/lib/secchiware/repository"),
        client_key_id: "Client".to_string(),
        client_secret: "client-secret".to_string(),
        c2_key_id: "C2".to_string(),
        node_secrets: BTreeMap::from([("Node1".to_string(), "node-secret".to_string())]),
        allowed_origins: vec!["https://operator.internal".to_string()],
        timeout_ms: 10_000,
        skew_secs: 300,
        lock_ttl_secs: 30,
        lock_wait_ms: 5_000,
        liveness: LivenessConfig::default(),
    }
}

fn assert_invalid(result: Result<(), ConfigError>, needle: &str) -> TestResult {
    match result {
        Err(error) => {
            let message = error.to_string();
            if message.contains(needle) {
                Ok(())
            } else {
                Err(format!("error {message} did not contain {needle}"))
            }
        }
        Ok(()) => Err("expected invalid config".to_string()),
    }
}

#[test]
fn minimal_config_is_valid() -> TestResult {
    minimal_config().validate().map_err(|err| err.to_string())
}

#[test]
fn rejects_empty_node_secret_table() -> TestResult {
    let mut config = minimal_config();
    config.node_secrets.clear();
    assert_invalid(config.validate(), "node_secrets must list at least one node")
}

#[test]
fn rejects_blank_node_secret() -> TestResult {
    let mut config = minimal_config();
    config.node_secrets.insert("Node2".to_string(), "   ".to_string());
    assert_invalid(config.validate(), "node_secrets entries must have non-empty ids and secrets")
}

#[test]
fn rejects_empty_origin_list() -> TestResult {
    let mut config = minimal_config();
    config.allowed_origins.clear();
    assert_invalid(config.validate(), "allowed_origins must list at least one origin")
}

#[test]
fn rejects_zero_liveness_attempts() -> TestResult {
    let mut config = minimal_config();
    config.liveness.attempts = 0;
    assert_invalid(config.validate(), "liveness.attempts must be >= 1")
}

#[test]
fn rejects_zero_lock_lease() -> TestResult {
    let mut config = minimal_config();
    config.lock_ttl_secs = 0;
    assert_invalid(config.validate(), "lock_ttl_secs must be greater than zero")
}

#[test]
fn loads_from_toml_with_defaults() {
    let dir = TempDir::new().expect("tempdir");
    let path = dir.path().join("c2.toml");
    fs::write(
        &path,
        r#"
database_path = "/var/lib/secchiware/c2.db"
repository_root = "/var/lib/secchiware/repository"
client_secret = "client-secret"
allowed_origins = ["*"]

[node_secrets]
Node1 = "node-secret"
"#,
    )
    .expect("write config");
    let config = C2Config::load(&path).expect("load");
    assert_eq!(config.listen_port, 5000);
    assert_eq!(config.client_key_id, "Client");
    assert_eq!(config.liveness.attempts, 3);
    assert_eq!(config.liveness.interval_secs, 30);
}
