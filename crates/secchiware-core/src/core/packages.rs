// crates/secchiware-core/src/core/packages.rs
// ============================================================================
// Module: Secchiware Package Tree
// Description: Recursive package/module/test-set wire model.
// Purpose: Represent installed test content identically on Node and C2.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! The package tree is the wire answer to `GET /test_sets` on both services.
//! A package contains subpackages and modules; a module contains test sets; a
//! test set contains tests. The wire schema allows unordered children, but
//! producers in this workspace always enumerate alphabetically so diffs of
//! two listings are reproducible.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;

// ============================================================================
// SECTION: Tree Nodes
// ============================================================================

/// One node of the recursive package tree.
///
/// # Invariants
/// - `name` is unique among siblings.
/// - `subpackages` and `modules` are sorted by name when produced locally.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageInfo {
    /// Package name (single identifier segment).
    pub name: String,
    /// Nested packages, sorted by name.
    pub subpackages: Vec<PackageInfo>,
    /// Modules directly contained in this package, sorted by name.
    pub modules: Vec<ModuleInfo>,
}

/// A module grouping test sets.
///
/// # Invariants
/// - `test_sets` is sorted by name when produced locally.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleInfo {
    /// Module name (single identifier segment).
    pub name: String,
    /// Test sets declared by the module, sorted by name.
    pub test_sets: Vec<TestSetInfo>,
}

/// A named family of tests sharing setup/teardown semantics.
///
/// # Invariants
/// - `tests` is sorted by name when produced locally.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestSetInfo {
    /// Test set name (single identifier segment).
    pub name: String,
    /// Human description inherited by tests without one of their own.
    pub description: String,
    /// Tests contained in the set, sorted by name.
    pub tests: Vec<TestInfo>,
}

/// Leaf executable unit metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestInfo {
    /// Test name (single identifier segment).
    pub name: String,
    /// Human description of the detection the test attempts.
    pub description: String,
}

// ============================================================================
// SECTION: Traversal Helpers
// ============================================================================

/// Collects the canonical names of every test under the given roots.
///
/// Names are emitted in the same order the tree enumerates them, which is
/// alphabetical for locally produced trees.
#[must_use]
pub fn collect_test_names(packages: &[PackageInfo]) -> Vec<String> {
    let mut names = Vec::new();
    for package in packages {
        collect_package(package, package.name.as_str(), &mut names);
    }
    names
}

/// Recursively collects canonical test names under one package node.
fn collect_package(package: &PackageInfo, prefix: &str, names: &mut Vec<String>) {
    for sub in &package.subpackages {
        let child = format!("{prefix}.{}", sub.name);
        collect_package(sub, &child, names);
    }
    for module in &package.modules {
        for set in &module.test_sets {
            for test in &set.tests {
                names.push(format!("{prefix}.{}.{}.{}", module.name, set.name, test.name));
            }
        }
    }
}
