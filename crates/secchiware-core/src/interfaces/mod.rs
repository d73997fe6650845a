// crates/secchiware-core/src/interfaces/mod.rs
// ============================================================================
// Module: Secchiware Interfaces
// Description: Backend-agnostic interfaces for the broker and session store.
// Purpose: Define the contract surfaces the C2 and Node services depend on.
// Dependencies: serde_json, thiserror, crate::core
// ============================================================================

//! ## Overview
//! Interfaces define how the services integrate with external state without
//! embedding backend details. The cache/lock broker holds the active-node
//! table, replay nonces, and named mutexes; the session store holds durable
//! history. Implementations must be safe for concurrent use and fail closed
//! on missing or invalid data.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::time::Duration;

use serde_json::Value;
use thiserror::Error;

use crate::core::identifiers::EnvironmentEndpoint;
use crate::core::platform::PlatformInfo;
use crate::core::report::TestReport;
use crate::core::session::ExecutionQuery;
use crate::core::session::ExecutionRecord;
use crate::core::session::SessionDetail;
use crate::core::session::SessionQuery;
use crate::core::session::SessionRecord;
use crate::core::time::Timestamp;

// ============================================================================
// SECTION: Cache/Lock Broker
// ============================================================================

/// Broker errors.
///
/// # Invariants
/// - Variants are stable for programmatic handling.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BrokerError {
    /// Broker backend reported an error.
    #[error("broker error: {0}")]
    Backend(String),
}

/// Fencing token returned by mutex acquisition.
///
/// # Invariants
/// - Tokens increase monotonically per mutex name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FencingToken(u64);

impl FencingToken {
    /// Wraps a raw token value.
    #[must_use]
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    /// Returns the raw token value.
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

/// Shared cache/lock broker used for ephemeral coordination state.
///
/// The broker holds the active-node table (JSON values under string keys),
/// replay-prevention nonce counters, and named mutexes with fencing tokens.
/// Any external key-value store with atomic primitives satisfies this
/// contract; an in-process implementation ships in `secchiware-broker`.
pub trait CacheBroker: Send + Sync {
    /// Reads a value.
    ///
    /// # Errors
    ///
    /// Returns [`BrokerError`] when the backend fails.
    fn get(&self, key: &str) -> Result<Option<Value>, BrokerError>;

    /// Writes a value with an optional time-to-live.
    ///
    /// # Errors
    ///
    /// Returns [`BrokerError`] when the backend fails.
    fn set(&self, key: &str, value: Value, ttl: Option<Duration>) -> Result<(), BrokerError>;

    /// Deletes a value, reporting whether it existed.
    ///
    /// # Errors
    ///
    /// Returns [`BrokerError`] when the backend fails.
    fn delete(&self, key: &str) -> Result<bool, BrokerError>;

    /// Lists live keys with the given prefix.
    ///
    /// # Errors
    ///
    /// Returns [`BrokerError`] when the backend fails.
    fn keys(&self, prefix: &str) -> Result<Vec<String>, BrokerError>;

    /// Attempts to acquire a named mutex for `ttl`.
    ///
    /// Returns `None` when the mutex is currently held.
    ///
    /// # Errors
    ///
    /// Returns [`BrokerError`] when the backend fails.
    fn acquire(&self, name: &str, ttl: Duration) -> Result<Option<FencingToken>, BrokerError>;

    /// Releases a named mutex, reporting whether the token was current.
    ///
    /// # Errors
    ///
    /// Returns [`BrokerError`] when the backend fails.
    fn release(&self, name: &str, token: FencingToken) -> Result<bool, BrokerError>;

    /// Atomically increments a counter, creating it with `ttl` when absent.
    ///
    /// Returns the post-increment value; the first observation returns 1.
    ///
    /// # Errors
    ///
    /// Returns [`BrokerError`] when the backend fails.
    fn incr(&self, key: &str, ttl: Duration) -> Result<u64, BrokerError>;
}

// ============================================================================
// SECTION: Session Store
// ============================================================================

/// Session store errors.
///
/// # Invariants
/// - Variants are stable for programmatic handling.
/// - Messages never embed report payloads.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Store I/O error.
    #[error("session store io error: {0}")]
    Io(String),
    /// Database engine error.
    #[error("session store db error: {0}")]
    Db(String),
    /// Invalid stored data.
    #[error("session store invalid data: {0}")]
    Invalid(String),
    /// The referenced row does not exist.
    #[error("session store row not found: {0}")]
    NotFound(String),
    /// The operation targeted an active session that requires closure first.
    #[error("session {0} is active")]
    ActiveSession(i64),
}

/// Durable store for sessions, executions, and reports.
///
/// Session rows own execution rows own report rows; deletes cascade. The
/// store enforces the single-active-session invariant per endpoint.
pub trait SessionStore: Send + Sync {
    /// Opens a session for an endpoint, returning the new session id.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when a session is already active for the
    /// endpoint or the database fails.
    fn open_session(
        &self,
        endpoint: &EnvironmentEndpoint,
        platform: &PlatformInfo,
        started: &Timestamp,
    ) -> Result<i64, StoreError>;

    /// Closes a session by id.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] when the session does not exist.
    fn close_session(&self, session_id: i64, ended: &Timestamp) -> Result<(), StoreError>;

    /// Returns the active session for an endpoint, if any.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the database fails.
    fn find_active(
        &self,
        endpoint: &EnvironmentEndpoint,
    ) -> Result<Option<SessionRecord>, StoreError>;

    /// Lists sessions matching the query.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the database fails.
    fn list_sessions(&self, query: &SessionQuery) -> Result<Vec<SessionRecord>, StoreError>;

    /// Returns one session with nested executions and reports.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the database fails.
    fn session_detail(&self, session_id: i64) -> Result<Option<SessionDetail>, StoreError>;

    /// Deletes a finished session and cascades its executions and reports.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::ActiveSession`] for active sessions and
    /// [`StoreError::NotFound`] for missing ones.
    fn delete_session(&self, session_id: i64) -> Result<(), StoreError>;

    /// Opens an execution under a session, returning the new execution id.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] when the session does not exist.
    fn open_execution(&self, session_id: i64, registered: &Timestamp) -> Result<i64, StoreError>;

    /// Persists the reports of one execution.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the database fails.
    fn record_reports(&self, execution_id: i64, reports: &[TestReport]) -> Result<(), StoreError>;

    /// Lists executions matching the query.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the database fails.
    fn list_executions(&self, query: &ExecutionQuery) -> Result<Vec<ExecutionRecord>, StoreError>;
}
