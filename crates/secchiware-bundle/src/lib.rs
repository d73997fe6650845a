// crates/secchiware-bundle/src/lib.rs
// ============================================================================
// Module: Secchiware Bundle Library
// Description: Test-package model, loader, runner, and tar-gz bundles.
// Purpose: Discover, distribute, and execute declarative detection tests.
// Dependencies: secchiware-core, serde, toml, tar, flate2
// ============================================================================

//! ## Overview
//! Secchiware Bundle owns everything between the test root on disk and the
//! wire: deterministic discovery of the package tree, the declarative probe
//! DSL that test modules are written in, the atomic in-memory registry, the
//! sequential test runner, and the gzipped-tar bundle format used for
//! replication.
//! Invariants:
//! - Discovery enumerates packages, modules, sets, and tests alphabetically.
//! - A failed reload never replaces the previous registry snapshot.
//! - Bundle extraction rejects every path that would escape the test root.
//!
//! Security posture: bundles and module files are untrusted input; parsing
//! and extraction fail closed.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod archive;
pub mod definition;
pub mod discovery;
pub mod multipart;
pub mod registry;
pub mod runner;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use archive::ArchiveError;
pub use archive::MAX_BUNDLE_BYTES;
pub use archive::bundle_roots;
pub use archive::pack;
pub use archive::unpack;
pub use definition::DefinitionError;
pub use definition::EnvVarExpect;
pub use definition::ModuleDefinition;
pub use definition::ProbeDefinition;
pub use definition::TestDefinition;
pub use definition::TestSetDefinition;
pub use discovery::DiscoveryError;
pub use discovery::Snapshot;
pub use discovery::discover;
pub use multipart::BUNDLE_BOUNDARY;
pub use multipart::BUNDLE_PART_NAME;
pub use multipart::MultipartError;
pub use multipart::bundle_content_type;
pub use multipart::encode_bundle_body;
pub use multipart::extract_part;
pub use multipart::parse_boundary;
pub use registry::RegistryError;
pub use registry::TestRegistry;
pub use runner::ExecutionPlan;
pub use runner::PlannedSet;
pub use runner::PlannedTest;
pub use runner::execute;
