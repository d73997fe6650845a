// crates/secchiware-bundle/src/definition/tests.rs
// ============================================================================
// Module: Definition Unit Tests
// Description: Unit tests for the probe DSL parser and validator.
// Purpose: Validate module TOML parsing and probe consistency checks.
// Dependencies: secchiware-bundle
// ============================================================================

//! ## Overview
//! Exercises module TOML parsing, name validation, and probe consistency.

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

use super::DefinitionError;
use super::EnvVarExpect;
use super::ModuleDefinition;
use super::ProbeDefinition;

// ============================================================================
// SECTION: Parsing
// ============================================================================

#[test]
fn parses_full_module() {
    let raw = r#"
[set.network_artifacts]
description = "Network fingerprints left by analysis sandboxes"
setup = { probe = "command", program = "true" }
teardown = { probe = "command", program = "true" }

[set.network_artifacts.tests.proxy_env_present]
description = "Sandboxes often force an interception proxy"
probe = "env_var"
name = "HTTP_PROXY"
expect = "present"

[set.network_artifacts.tests.agent_socket]
probe = "file_exists"
path = "/var/run/agent.sock"
"#;
    let module = ModuleDefinition::parse(raw).expect("parse");
    let set = module.set.get("network_artifacts").expect("set");
    assert_eq!(set.tests.len(), 2);
    assert!(set.setup.is_some());
    let test = set.tests.get("proxy_env_present").expect("test");
    assert_eq!(
        test.probe,
        ProbeDefinition::EnvVar {
            name: "HTTP_PROXY".to_string(),
            expect: EnvVarExpect::Present,
            value: None,
        }
    );
    // Description inheritance happens at discovery; the raw definition keeps None.
    assert!(set.tests.get("agent_socket").expect("test").description.is_none());
}

#[test]
fn parses_every_probe_kind() {
    let raw = r#"
[set.probes]
description = "one of each"

[set.probes.tests.a]
probe = "env_var"
name = "X"
expect = "equals"
value = "1"

[set.probes.tests.b]
probe = "file_absent"
path = "/tmp/marker"

[set.probes.tests.c]
probe = "command"
program = "uname"
args = ["-a"]
timeout_ms = 500

[set.probes.tests.d]
probe = "cpu_count_at_least"
count = 2

[set.probes.tests.e]
probe = "uptime_at_least"
seconds = 600
"#;
    let module = ModuleDefinition::parse(raw).expect("parse");
    assert_eq!(module.set.get("probes").expect("set").tests.len(), 5);
}

// ============================================================================
// SECTION: Validation
// ============================================================================

#[test]
fn rejects_invalid_set_name() {
    let raw = r#"
[set."bad-name"]
description = "hyphen is not an identifier"
"#;
    assert!(matches!(
        ModuleDefinition::parse(raw),
        Err(DefinitionError::InvalidName(name)) if name == "bad-name"
    ));
}

#[test]
fn rejects_equals_without_value() {
    let raw = r#"
[set.s]
description = "d"

[set.s.tests.t]
probe = "env_var"
name = "X"
expect = "equals"
"#;
    assert!(matches!(ModuleDefinition::parse(raw), Err(DefinitionError::InvalidProbe(_))));
}

#[test]
fn rejects_unknown_probe_kind() {
    let raw = r#"
[set.s]
description = "d"

[set.s.tests.t]
probe = "registry_key"
path = "HKLM"
"#;
    assert!(matches!(ModuleDefinition::parse(raw), Err(DefinitionError::Parse(_))));
}

#[test]
fn rejects_zero_cpu_bound() {
    let raw = r#"
[set.s]
description = "d"

[set.s.tests.t]
probe = "cpu_count_at_least"
count = 0
"#;
    assert!(matches!(ModuleDefinition::parse(raw), Err(DefinitionError::InvalidProbe(_))));
}
