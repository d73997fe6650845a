// crates/secchiware-c2/src/telemetry.rs
// ============================================================================
// Module: C2 Telemetry
// Description: Observability hooks for C2 request handling and sweeping.
// Purpose: Provide metric events without hard dependencies.
// Dependencies: none beyond std
// ============================================================================

//! ## Overview
//! A thin metrics interface for C2 operation counters, including sweeper
//! transitions. Deployments plug in their own sink; the default discards
//! events. Labels never carry request payloads or secrets.

// ============================================================================
// SECTION: Metric Labels
// ============================================================================

/// C2 operation classification.
///
/// # Invariants
/// - Variants are stable for telemetry labeling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum C2Operation {
    /// `POST /environments`.
    Register,
    /// `DELETE /environments/{ip}/{port}`.
    Deregister,
    /// `GET /environments`.
    ListEnvironments,
    /// `PATCH /environments/{ip}/{port}/installed`.
    Replicate,
    /// `GET /environments/{ip}/{port}/reports`.
    ProxyReports,
    /// Repository `GET /test_sets`.
    ListRepository,
    /// Repository `PATCH /test_sets`.
    InstallRepository,
    /// Repository `DELETE /test_sets/{package}`.
    RemoveRepository,
    /// `GET /sessions` and `GET /sessions/{id}`.
    QuerySessions,
    /// `DELETE /sessions/{id}`.
    DeleteSession,
    /// `GET /executions`.
    QueryExecutions,
    /// Liveness sweeper retiring a dead node.
    SweeperRetire,
    /// Best-effort report persistence that failed after a node run.
    PersistenceDropped,
}

impl C2Operation {
    /// Returns a stable label for the operation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Register => "register",
            Self::Deregister => "deregister",
            Self::ListEnvironments => "list_environments",
            Self::Replicate => "replicate",
            Self::ProxyReports => "proxy_reports",
            Self::ListRepository => "list_repository",
            Self::InstallRepository => "install_repository",
            Self::RemoveRepository => "remove_repository",
            Self::QuerySessions => "query_sessions",
            Self::DeleteSession => "delete_session",
            Self::QueryExecutions => "query_executions",
            Self::SweeperRetire => "sweeper_retire",
            Self::PersistenceDropped => "persistence_dropped",
        }
    }
}

/// Operation outcome classification.
///
/// # Invariants
/// - Variants are stable for telemetry labeling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum C2Outcome {
    /// Successful operation.
    Ok,
    /// Failed operation.
    Error,
}

/// C2 operation metric event payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct C2MetricEvent {
    /// Operation being recorded.
    pub operation: C2Operation,
    /// Operation outcome.
    pub outcome: C2Outcome,
}

// ============================================================================
// SECTION: Trait
// ============================================================================

/// Metrics sink for C2 operations.
pub trait C2Metrics: Send + Sync {
    /// Records an operation counter event.
    fn record(&self, event: C2MetricEvent);
}

/// No-op metrics sink.
///
/// # Invariants
/// - Metrics are intentionally discarded.
pub struct NoopMetrics;

impl C2Metrics for NoopMetrics {
    fn record(&self, _event: C2MetricEvent) {}
}
