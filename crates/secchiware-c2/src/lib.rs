// crates/secchiware-c2/src/lib.rs
// ============================================================================
// Module: Secchiware C2 Library
// Description: Command-and-control service for deployed nodes.
// Purpose: Track live nodes, replicate bundles, proxy executions, keep history.
// Dependencies: axum, tokio, reqwest, secchiware-core, secchiware-store-sqlite
// ============================================================================

//! ## Overview
//! The C2 authorizes Clients and Nodes, keeps the active-node table in the
//! shared broker, persists sessions/executions/reports in the durable store,
//! replicates repository packages to nodes as signed tar-gz bundles, proxies
//! test executions, and serves searchable history. A background sweeper
//! retires sessions whose nodes stop answering liveness probes.
//! Invariants:
//! - Active-table and repository mutations run under named broker mutexes.
//! - Reads take no locks and tolerate cache/database skew.
//! - Every response carries `Access-Control-Allow-Origin`.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod auth;
pub mod environments;
pub mod history;
pub(crate) mod query;
pub mod replication;
pub mod repository;
pub mod server;
pub mod sweeper;
pub mod telemetry;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use replication::NodeClient;
pub use replication::UpstreamError;
pub use server::ApiError;
pub use server::ServerState;
pub use server::ServerStateBuilder;
pub use server::build_router;
pub use telemetry::C2MetricEvent;
pub use telemetry::C2Metrics;
pub use telemetry::C2Operation;
pub use telemetry::C2Outcome;
pub use telemetry::NoopMetrics;
