// crates/secchiware-core/src/core/session.rs
// ============================================================================
// Module: Secchiware Session Records
// Description: Durable session/execution/report records and history queries.
// Purpose: Define the persisted state machine types and their search filters.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! A session spans one node registration at the C2. Executions belong to a
//! session; report rows belong to an execution; both cascade with their
//! owner. [`ActiveEnvironment`] is the broker-resident entry mirroring the
//! currently open session for an endpoint. Query types carry the validated
//! filter/ordering parameters of the searchable history endpoints.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;

use crate::core::identifiers::KeyId;
use crate::core::platform::PlatformInfo;
use crate::core::report::TestReport;
use crate::core::time::Timestamp;

// ============================================================================
// SECTION: Durable Records
// ============================================================================

/// One persisted session row.
///
/// # Invariants
/// - `session_end` is `None` iff the session is active.
/// - At most one active session exists per `(env_ip, env_port)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionRecord {
    /// Session identifier (database-assigned).
    pub id: i64,
    /// Instant the registration opened the session.
    pub session_start: Timestamp,
    /// Instant the session closed; `None` while active.
    pub session_end: Option<Timestamp>,
    /// Environment IP address.
    pub env_ip: String,
    /// Environment listener port.
    pub env_port: u16,
    /// Denormalized platform fingerprint captured at registration.
    pub platform: PlatformInfo,
}

/// One persisted execution row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionRecord {
    /// Execution identifier (database-assigned).
    pub id: i64,
    /// Owning session identifier.
    pub fk_session: i64,
    /// Instant the C2 registered the execution.
    pub timestamp_registered: Timestamp,
}

/// One persisted report row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportRecord {
    /// Report identifier (database-assigned).
    pub id: i64,
    /// Owning execution identifier.
    pub fk_execution: i64,
    /// The recorded test report.
    #[serde(flatten)]
    pub report: TestReport,
}

/// Session detail with nested executions and reports.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionDetail {
    /// The session row.
    #[serde(flatten)]
    pub session: SessionRecord,
    /// Executions owned by the session, with their reports.
    pub executions: Vec<ExecutionDetail>,
}

/// Execution detail with nested reports.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionDetail {
    /// The execution row.
    #[serde(flatten)]
    pub execution: ExecutionRecord,
    /// Reports recorded under the execution.
    pub reports: Vec<ReportRecord>,
}

// ============================================================================
// SECTION: Registration
// ============================================================================

/// Body of a node's `POST /environments` registration request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistrationRequest {
    /// IP address the node's listener is reachable at.
    pub ip: String,
    /// Port the node's listener is reachable at.
    pub port: u16,
    /// Platform fingerprint gathered at startup.
    pub platform: PlatformInfo,
}

// ============================================================================
// SECTION: Active-Node Entry
// ============================================================================

/// Broker-resident entry for one live environment.
///
/// # Invariants
/// - `session_id` references an open session row.
/// - Entries exist only between registration and deregistration/liveness
///   failure; they are never durable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActiveEnvironment {
    /// Open session identifier.
    pub session_id: i64,
    /// Instant the session opened.
    pub session_start: Timestamp,
    /// Key identity the node registered under.
    pub key_id: KeyId,
    /// Platform fingerprint reported at registration.
    pub platform: PlatformInfo,
}

// ============================================================================
// SECTION: History Queries
// ============================================================================

/// Sort direction for history queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Arrange {
    /// Ascending order.
    #[default]
    Asc,
    /// Descending order.
    Desc,
}

impl Arrange {
    /// Returns the stable wire label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Asc => "asc",
            Self::Desc => "desc",
        }
    }

    /// Parses a wire label.
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "asc" => Some(Self::Asc),
            "desc" => Some(Self::Desc),
            _ => None,
        }
    }
}

/// Orderable columns for session queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionOrder {
    /// Order by session identifier.
    #[default]
    Id,
    /// Order by session start instant.
    SessionStart,
    /// Order by session end instant.
    SessionEnd,
    /// Order by environment IP.
    EnvIp,
    /// Order by environment port.
    EnvPort,
}

impl SessionOrder {
    /// Parses a wire label.
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "id" => Some(Self::Id),
            "session_start" => Some(Self::SessionStart),
            "session_end" => Some(Self::SessionEnd),
            "env_ip" => Some(Self::EnvIp),
            "env_port" => Some(Self::EnvPort),
            _ => None,
        }
    }
}

/// Orderable columns for execution queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExecutionOrder {
    /// Order by execution identifier.
    #[default]
    Id,
    /// Order by owning session identifier.
    FkSession,
    /// Order by registration instant.
    TimestampRegistered,
}

impl ExecutionOrder {
    /// Parses a wire label.
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "id" => Some(Self::Id),
            "fk_session" => Some(Self::FkSession),
            "timestamp_registered" => Some(Self::TimestampRegistered),
            _ => None,
        }
    }
}

/// Validated filter set for session listings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionQuery {
    /// Restrict to these session identifiers.
    pub ids: Vec<i64>,
    /// Restrict to these environment IPs.
    pub ips: Vec<String>,
    /// Restrict to these environment ports.
    pub ports: Vec<u16>,
    /// Restrict to these OS system names.
    pub systems: Vec<String>,
    /// Only sessions started at or after this instant.
    pub started_after: Option<Timestamp>,
    /// Only sessions started at or before this instant.
    pub started_before: Option<Timestamp>,
    /// Only sessions closed at or after this instant.
    pub closed_after: Option<Timestamp>,
    /// Only sessions closed at or before this instant.
    pub closed_before: Option<Timestamp>,
    /// Sort column.
    pub order_by: SessionOrder,
    /// Sort direction.
    pub arrange: Arrange,
    /// Maximum rows returned.
    pub limit: Option<u64>,
    /// Rows skipped before the first returned row.
    pub offset: u64,
}

/// Validated filter set for execution listings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecutionQuery {
    /// Restrict to these execution identifiers.
    pub ids: Vec<i64>,
    /// Restrict to executions owned by these sessions.
    pub sessions: Vec<i64>,
    /// Only executions registered at or after this instant.
    pub registered_after: Option<Timestamp>,
    /// Only executions registered at or before this instant.
    pub registered_before: Option<Timestamp>,
    /// Sort column.
    pub order_by: ExecutionOrder,
    /// Sort direction.
    pub arrange: Arrange,
    /// Maximum rows returned.
    pub limit: Option<u64>,
    /// Rows skipped before the first returned row.
    pub offset: u64,
}
