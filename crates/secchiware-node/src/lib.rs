// crates/secchiware-node/src/lib.rs
// ============================================================================
// Module: Secchiware Node Library
// Description: Node HTTP service inside the analysis environment.
// Purpose: Serve test listings, installs, and executions; register with C2.
// Dependencies: axum, tokio, reqwest, secchiware-core, secchiware-bundle
// ============================================================================

//! ## Overview
//! The node runs inside the analysis environment under test. It serves the
//! installed package tree, accepts C2-signed bundle installs and removals,
//! executes selected tests, and shuts down on a C2-signed request. At
//! startup it registers with the C2; when registration fails it falls back
//! to stand-alone mode: run every installed test once, emit the report array
//! on standard output, and exit.
//! Invariants:
//! - Test executions are serialized; one runs at a time per process.
//! - Registry mutations happen under the registry's writer lock.
//! - Mutating endpoints require a valid C2 signature.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod auth;
pub mod registration;
pub mod server;
pub mod standalone;
pub mod telemetry;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use registration::C2Client;
pub use registration::RegistrationError;
pub use server::ApiError;
pub use server::ServerState;
pub use server::build_router;
pub use standalone::run_standalone;
pub use telemetry::NodeEndpoint;
pub use telemetry::NodeMetricEvent;
pub use telemetry::NodeMetrics;
pub use telemetry::NodeOutcome;
pub use telemetry::NoopMetrics;
