// crates/secchiware-bundle/src/registry/tests.rs
// ============================================================================
// Module: Registry Unit Tests
// Description: Unit tests for atomic snapshot swaps and bundle lifecycle.
// Purpose: Validate install/remove/reload behavior against a temp test root.
// Dependencies: secchiware-bundle, tempfile
// ============================================================================

//! ## Overview
//! Exercises the registry lifecycle: initial discovery, bundle installation,
//! removal, and the reload-failure path that must keep the previous snapshot.

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

use std::fs;
use std::path::Path;

use tempfile::TempDir;

use super::RegistryError;
use super::TestRegistry;
use crate::archive::pack;

// ============================================================================
// SECTION: Fixtures
// ============================================================================

/// Minimal module document used in fixtures.
const MODULE_TOML: &str = r#"
[set.s]
description = "fixture"

[set.s.tests.t]
probe = "file_absent"
path = "/nonexistent/marker"
"#;

fn write_module(root: &Path, package_path: &str, module: &str, contents: &str) {
    let dir = root.join(package_path);
    fs::create_dir_all(&dir).expect("create package dir");
    fs::write(dir.join(format!("{module}.toml")), contents).expect("write module");
}

fn bundle_with_package(package: &str) -> Vec<u8> {
    let source = TempDir::new().expect("source");
    write_module(source.path(), package, "m", MODULE_TOML);
    pack(source.path(), &[package.to_string()]).expect("pack")
}

// ============================================================================
// SECTION: Lifecycle
// ============================================================================

#[test]
fn open_on_empty_root_yields_empty_tree() {
    let root = TempDir::new().expect("root");
    let registry = TestRegistry::open(root.path()).expect("open");
    let snapshot = registry.snapshot().expect("snapshot");
    assert!(snapshot.tree().is_empty());
    assert_eq!(snapshot.test_count(), 0);
}

#[test]
fn installed_bundle_becomes_discoverable() {
    let root = TempDir::new().expect("root");
    let registry = TestRegistry::open(root.path()).expect("open");
    let replaced = registry.install_bundle(&bundle_with_package("p1")).expect("install");
    assert_eq!(replaced, vec!["p1".to_string()]);
    let snapshot = registry.snapshot().expect("snapshot");
    assert!(snapshot.has_root_package("p1"));
    assert_eq!(snapshot.test_count(), 1);
}

#[test]
fn remove_package_drops_subtree() {
    let root = TempDir::new().expect("root");
    write_module(root.path(), "p1", "m", MODULE_TOML);
    write_module(root.path(), "p2", "m", MODULE_TOML);
    let registry = TestRegistry::open(root.path()).expect("open");
    registry.remove_package("p1").expect("remove");
    let snapshot = registry.snapshot().expect("snapshot");
    assert!(!snapshot.has_root_package("p1"));
    assert!(snapshot.has_root_package("p2"));
    assert!(matches!(
        registry.remove_package("p1"),
        Err(RegistryError::UnknownPackage(_))
    ));
}

#[test]
fn failed_reload_keeps_previous_snapshot() {
    let root = TempDir::new().expect("root");
    write_module(root.path(), "p1", "m", MODULE_TOML);
    let registry = TestRegistry::open(root.path()).expect("open");
    let before = registry.snapshot().expect("snapshot");

    // A bundle whose module file is invalid TOML extracts fine but fails
    // discovery; the registry must keep serving the old snapshot.
    let source = TempDir::new().expect("source");
    write_module(source.path(), "p2", "broken", "not valid toml [");
    let bundle = pack(source.path(), &["p2".to_string()]).expect("pack");
    assert!(registry.install_bundle(&bundle).is_err());

    let after = registry.snapshot().expect("snapshot");
    assert_eq!(before.tree(), after.tree());
}

#[test]
fn pack_rejects_unknown_packages() {
    let root = TempDir::new().expect("root");
    write_module(root.path(), "p1", "m", MODULE_TOML);
    let registry = TestRegistry::open(root.path()).expect("open");
    assert!(registry.pack_packages(&["p1".to_string()]).is_ok());
    assert!(matches!(
        registry.pack_packages(&["p1".to_string(), "ghost".to_string()]),
        Err(RegistryError::UnknownPackage(name)) if name == "ghost"
    ));
}
