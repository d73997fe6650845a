//! Node config validation tests for secchiware-config.
// crates/secchiware-config/tests/node_validation.rs
// =============================================================================
// Module: Node Config Validation Tests
// Description: Validate node identity, endpoint, and timeout constraints.
// Purpose: Ensure node settings fail closed before any socket binds.
// =============================================================================

#![allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    reason = "Test-only assertions."
)]

use std::fs;
use std::path::PathBuf;

use secchiware_config::ConfigError;
use secchiware_config::NodeConfig;
use tempfile::TempDir;

type TestResult = Result<(), String>;

fn minimal_config() -> NodeConfig {
    NodeConfig {
        c2_host: "c2.internal".to_string(),
        c2_port: 5000,
        listen_ip: "0.0.0.0".to_string(),
        listen_port: 4900,
        key_id: "Node1".to_string(),
        secret: "node-secret".to_string(),
        c2_key_id: "C2".to_string(),
        c2_secret: "c2-secret".to_string(),
        test_root: PathBuf::from("/var/lib/secchiware/tests"),
        timeout_ms: 10_000,
        skew_secs: 300,
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
fn rejects_empty_c2_host() -> TestResult {
    let mut config = minimal_config();
    config.c2_host = "  ".to_string();
    assert_invalid(config.validate(), "c2_host must be non-empty")
}

#[test]
fn rejects_zero_listen_port() -> TestResult {
    let mut config = minimal_config();
    config.listen_port = 0;
    assert_invalid(config.validate(), "listen_port must be non-zero")
}

#[test]
fn rejects_empty_secret() -> TestResult {
    let mut config = minimal_config();
    config.secret = String::new();
    assert_invalid(config.validate(), "secret must be non-empty")
}

#[test]
fn rejects_empty_test_root() -> TestResult {
    let mut config = minimal_config();
    config.test_root = PathBuf::new();
    assert_invalid(config.validate(), "test_root must be non-empty")
}

#[test]
fn rejects_zero_timeout() -> TestResult {
    let mut config = minimal_config();
    config.timeout_ms = 0;
    assert_invalid(config.validate(), "timeout_ms must be greater than zero")
}

#[test]
fn loads_from_toml_with_defaults() {
    let dir = TempDir::new().expect("tempdir");
    let path = dir.path().join("node.toml");
    fs::write(
        &path,
        r#"
c2_host = "c2.internal"
key_id = "Node1"
secret = "node-secret"
c2_secret = "c2-secret"
test_root = "/var/lib/secchiware/tests"
"#,
    )
    .expect("write config");
    let config = NodeConfig::load(&path).expect("load");
    assert_eq!(config.listen_port, 4900);
    assert_eq!(config.c2_port, 5000);
    assert_eq!(config.c2_key_id, "C2");
    assert_eq!(config.skew_secs, 300);
}

#[test]
fn accepts_wire_spelling_aliases() {
    let dir = TempDir::new().expect("tempdir");
    let path = dir.path().join("node.toml");
    fs::write(
        &path,
        r#"
c2_host = "c2.internal"
keyId = "Node1"
secret = "node-secret"
c2_public_keyId = "C2"
c2_secret = "c2-secret"
test_root = "/var/lib/secchiware/tests"
"#,
    )
    .expect("write config");
    let config = NodeConfig::load(&path).expect("load");
    assert_eq!(config.key_id, "Node1");
    assert_eq!(config.c2_key_id, "C2");
}

#[test]
fn rejects_unknown_fields() {
    let dir = TempDir::new().expect("tempdir");
    let path = dir.path().join("node.toml");
    fs::write(
        &path,
        r#"
c2_host = "c2.internal"
key_id = "Node1"
secret = "node-secret"
c2_secret = "c2-secret"
test_root = "/var/lib/secchiware/tests"
surprise = true
"#,
    )
    .expect("write config");
    assert!(matches!(NodeConfig::load(&path), Err(ConfigError::Parse(_))));
}
