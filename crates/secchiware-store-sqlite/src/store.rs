// crates/secchiware-store-sqlite/src/store.rs
// ============================================================================
// Module: SQLite Session Store
// Description: Durable SessionStore with cascade ownership and WAL.
// Purpose: Persist registration history and execution evidence.
// Dependencies: secchiware-core, rusqlite, serde_json, thiserror
// ============================================================================

//! ## Overview
//! The store keeps three tables — `session`, `execution`, `report` — with
//! cascading foreign keys and a partial unique index on
//! `session(env_ip, env_port) WHERE session_end IS NULL` enforcing the
//! single-active-session invariant. Timestamps are stored in the fixed-width
//! RFC 3339 wire form, which sorts chronologically as text. Connection access
//! is serialized through a mutex.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use std::sync::Mutex;

use rusqlite::Connection;
use rusqlite::OptionalExtension;
use rusqlite::ToSql;
use rusqlite::params;
use rusqlite::params_from_iter;
use secchiware_core::Arrange;
use secchiware_core::EnvironmentEndpoint;
use secchiware_core::ExecutionDetail;
use secchiware_core::ExecutionOrder;
use secchiware_core::ExecutionQuery;
use secchiware_core::ExecutionRecord;
use secchiware_core::OsInfo;
use secchiware_core::PlatformInfo;
use secchiware_core::ReportRecord;
use secchiware_core::RuntimeInfo;
use secchiware_core::SessionDetail;
use secchiware_core::SessionOrder;
use secchiware_core::SessionQuery;
use secchiware_core::SessionRecord;
use secchiware_core::SessionStore;
use secchiware_core::StoreError;
use secchiware_core::TestReport;
use secchiware_core::Timestamp;
use serde_json::Value;
use thiserror::Error;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// `SQLite` schema version for the store.
const SCHEMA_VERSION: i64 = 1;
/// Busy timeout applied to every connection (ms).
const BUSY_TIMEOUT_MS: u64 = 5_000;

/// Schema creation statements.
const SCHEMA_SQL: &str = "CREATE TABLE IF NOT EXISTS session (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    session_start TEXT NOT NULL,
    session_end TEXT,
    env_ip TEXT NOT NULL,
    env_port INTEGER NOT NULL,
    os_system TEXT NOT NULL,
    os_release TEXT NOT NULL,
    os_version TEXT NOT NULL,
    machine TEXT NOT NULL,
    processor TEXT NOT NULL,
    runtime_build TEXT NOT NULL,
    runtime_compiler TEXT NOT NULL,
    runtime_implementation TEXT NOT NULL,
    runtime_version TEXT NOT NULL
);
CREATE UNIQUE INDEX IF NOT EXISTS idx_session_active
    ON session(env_ip, env_port) WHERE session_end IS NULL;
CREATE TABLE IF NOT EXISTS execution (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    fk_session INTEGER NOT NULL REFERENCES session(id) ON DELETE CASCADE,
    timestamp_registered TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_execution_session ON execution(fk_session);
CREATE TABLE IF NOT EXISTS report (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    fk_execution INTEGER NOT NULL REFERENCES execution(id) ON DELETE CASCADE,
    test_name TEXT NOT NULL,
    test_description TEXT NOT NULL,
    result_code INTEGER NOT NULL,
    timestamp_start TEXT NOT NULL,
    timestamp_end TEXT NOT NULL,
    additional_info TEXT
);
CREATE INDEX IF NOT EXISTS idx_report_execution ON report(fk_execution);";

/// Column list selected for session rows.
const SESSION_COLUMNS: &str = "id, session_start, session_end, env_ip, env_port, \
    os_system, os_release, os_version, machine, processor, \
    runtime_build, runtime_compiler, runtime_implementation, runtime_version";

// ============================================================================
// SECTION: Errors
// ============================================================================

/// `SQLite` store errors.
///
/// # Invariants
/// - Error messages avoid embedding report payloads.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SqliteStoreError {
    /// Store I/O error.
    #[error("sqlite store io error: {0}")]
    Io(String),
    /// `SQLite` engine error.
    #[error("sqlite store db error: {0}")]
    Db(String),
    /// Store schema version mismatch.
    #[error("sqlite store version mismatch: {0}")]
    VersionMismatch(String),
    /// Invalid stored data.
    #[error("sqlite store invalid data: {0}")]
    Invalid(String),
    /// Referenced row does not exist.
    #[error("sqlite store row not found: {0}")]
    NotFound(String),
    /// The endpoint already has an active session.
    #[error("session {0} is active")]
    ActiveSession(i64),
}

impl From<SqliteStoreError> for StoreError {
    fn from(error: SqliteStoreError) -> Self {
        match error {
            SqliteStoreError::Io(message) => Self::Io(message),
            SqliteStoreError::Db(message) | SqliteStoreError::VersionMismatch(message) => {
                Self::Db(message)
            }
            SqliteStoreError::Invalid(message) => Self::Invalid(message),
            SqliteStoreError::NotFound(message) => Self::NotFound(message),
            SqliteStoreError::ActiveSession(id) => Self::ActiveSession(id),
        }
    }
}

/// Maps a rusqlite error to a store error.
fn db_err(err: &rusqlite::Error) -> SqliteStoreError {
    SqliteStoreError::Db(err.to_string())
}

// ============================================================================
// SECTION: Store
// ============================================================================

/// `SQLite`-backed session store.
///
/// # Invariants
/// - Connection access is serialized through a mutex.
/// - Foreign keys are enabled on every connection.
#[derive(Clone)]
pub struct SqliteSessionStore {
    /// Shared connection guarded by a mutex.
    connection: Arc<Mutex<Connection>>,
}

impl SqliteSessionStore {
    /// Opens (and migrates) a store at the given database path.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError`] when the database cannot be opened or the
    /// stored schema version is incompatible.
    pub fn open(path: &Path) -> Result<Self, SqliteStoreError> {
        let connection = Connection::open(path).map_err(|err| db_err(&err))?;
        connection
            .execute_batch("PRAGMA journal_mode = wal;")
            .map_err(|err| db_err(&err))?;
        Self::from_connection(connection)
    }

    /// Opens an in-memory store (tests and stand-alone tooling).
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError`] when initialization fails.
    pub fn open_in_memory() -> Result<Self, SqliteStoreError> {
        let connection = Connection::open_in_memory().map_err(|err| db_err(&err))?;
        Self::from_connection(connection)
    }

    /// Applies pragmas and schema to a fresh connection.
    fn from_connection(connection: Connection) -> Result<Self, SqliteStoreError> {
        connection
            .execute_batch("PRAGMA foreign_keys = ON;")
            .map_err(|err| db_err(&err))?;
        connection
            .busy_timeout(std::time::Duration::from_millis(BUSY_TIMEOUT_MS))
            .map_err(|err| db_err(&err))?;
        connection
            .execute_batch("CREATE TABLE IF NOT EXISTS store_meta (version INTEGER NOT NULL);")
            .map_err(|err| db_err(&err))?;
        let stored: Option<i64> = connection
            .query_row("SELECT version FROM store_meta LIMIT 1", [], |row| row.get(0))
            .optional()
            .map_err(|err| db_err(&err))?;
        match stored {
            None => {
                connection.execute_batch(SCHEMA_SQL).map_err(|err| db_err(&err))?;
                connection
                    .execute("INSERT INTO store_meta (version) VALUES (?1)", params![SCHEMA_VERSION])
                    .map_err(|err| db_err(&err))?;
            }
            Some(version) if version == SCHEMA_VERSION => {
                connection.execute_batch(SCHEMA_SQL).map_err(|err| db_err(&err))?;
            }
            Some(version) => {
                return Err(SqliteStoreError::VersionMismatch(format!(
                    "found schema version {version}, expected {SCHEMA_VERSION}"
                )));
            }
        }
        Ok(Self {
            connection: Arc::new(Mutex::new(connection)),
        })
    }

    /// Locks the connection, mapping poisoning to a database error.
    fn locked(&self) -> Result<std::sync::MutexGuard<'_, Connection>, SqliteStoreError> {
        self.connection
            .lock()
            .map_err(|_| SqliteStoreError::Db("connection mutex poisoned".to_string()))
    }
}

// ============================================================================
// SECTION: Row Mapping
// ============================================================================

/// Session row as read from the database.
struct RawSession {
    /// Session identifier.
    id: i64,
    /// RFC 3339 session start.
    session_start: String,
    /// RFC 3339 session end, when closed.
    session_end: Option<String>,
    /// Environment IP.
    env_ip: String,
    /// Environment port as stored.
    env_port: i64,
    /// OS system name.
    os_system: String,
    /// OS release string.
    os_release: String,
    /// OS version string.
    os_version: String,
    /// Machine hardware name.
    machine: String,
    /// Processor description.
    processor: String,
    /// Runtime build label.
    runtime_build: String,
    /// Runtime compiler.
    runtime_compiler: String,
    /// Runtime implementation.
    runtime_implementation: String,
    /// Runtime version.
    runtime_version: String,
}

/// Reads a session row in `SESSION_COLUMNS` order.
fn read_raw_session(row: &rusqlite::Row<'_>) -> Result<RawSession, rusqlite::Error> {
    Ok(RawSession {
        id: row.get(0)?,
        session_start: row.get(1)?,
        session_end: row.get(2)?,
        env_ip: row.get(3)?,
        env_port: row.get(4)?,
        os_system: row.get(5)?,
        os_release: row.get(6)?,
        os_version: row.get(7)?,
        machine: row.get(8)?,
        processor: row.get(9)?,
        runtime_build: row.get(10)?,
        runtime_compiler: row.get(11)?,
        runtime_implementation: row.get(12)?,
        runtime_version: row.get(13)?,
    })
}

/// Converts a raw row to the wire record, validating stored values.
fn convert_session(raw: RawSession) -> Result<SessionRecord, SqliteStoreError> {
    let session_start = Timestamp::parse(&raw.session_start)
        .map_err(|err| SqliteStoreError::Invalid(err.to_string()))?;
    let session_end = raw
        .session_end
        .as_deref()
        .map(Timestamp::parse)
        .transpose()
        .map_err(|err| SqliteStoreError::Invalid(err.to_string()))?;
    let env_port = u16::try_from(raw.env_port)
        .map_err(|_| SqliteStoreError::Invalid(format!("stored port out of range: {}", raw.env_port)))?;
    Ok(SessionRecord {
        id: raw.id,
        session_start,
        session_end,
        env_ip: raw.env_ip,
        env_port,
        platform: PlatformInfo {
            os: OsInfo {
                system: raw.os_system,
                release: raw.os_release,
                version: raw.os_version,
            },
            machine: raw.machine,
            processor: raw.processor,
            runtime: RuntimeInfo {
                build: raw.runtime_build,
                compiler: raw.runtime_compiler,
                implementation: raw.runtime_implementation,
                version: raw.runtime_version,
            },
        },
    })
}

/// Formats a timestamp for storage.
fn stored_timestamp(value: &Timestamp) -> Result<String, SqliteStoreError> {
    value.to_rfc3339().map_err(|err| SqliteStoreError::Invalid(err.to_string()))
}

/// Returns the ORDER BY column for a session query.
const fn session_order_column(order: SessionOrder) -> &'static str {
    match order {
        SessionOrder::Id => "id",
        SessionOrder::SessionStart => "session_start",
        SessionOrder::SessionEnd => "session_end",
        SessionOrder::EnvIp => "env_ip",
        SessionOrder::EnvPort => "env_port",
    }
}

/// Returns the ORDER BY column for an execution query.
const fn execution_order_column(order: ExecutionOrder) -> &'static str {
    match order {
        ExecutionOrder::Id => "id",
        ExecutionOrder::FkSession => "fk_session",
        ExecutionOrder::TimestampRegistered => "timestamp_registered",
    }
}

/// Returns the ORDER BY direction keyword.
const fn arrange_keyword(arrange: Arrange) -> &'static str {
    match arrange {
        Arrange::Asc => "ASC",
        Arrange::Desc => "DESC",
    }
}

/// Appends an `IN (...)` clause for a non-empty value list.
fn push_in_clause<T: ToSql + Clone + 'static>(
    sql: &mut String,
    parameters: &mut Vec<Box<dyn ToSql>>,
    column: &str,
    values: &[T],
) {
    if values.is_empty() {
        return;
    }
    let placeholders = vec!["?"; values.len()].join(", ");
    sql.push_str(&format!(" AND {column} IN ({placeholders})"));
    for value in values {
        parameters.push(Box::new(value.clone()));
    }
}

/// Appends a comparison clause for an optional timestamp bound.
fn push_time_bound(
    sql: &mut String,
    parameters: &mut Vec<Box<dyn ToSql>>,
    column: &str,
    operator: &str,
    bound: Option<&Timestamp>,
) -> Result<(), SqliteStoreError> {
    if let Some(bound) = bound {
        sql.push_str(&format!(" AND {column} {operator} ?"));
        parameters.push(Box::new(stored_timestamp(bound)?));
    }
    Ok(())
}

/// Appends LIMIT/OFFSET with `SQLite`'s unlimited sentinel.
fn push_window(
    sql: &mut String,
    limit: Option<u64>,
    offset: u64,
) -> Result<(), SqliteStoreError> {
    let limit = match limit {
        Some(limit) => i64::try_from(limit)
            .map_err(|_| SqliteStoreError::Invalid(format!("limit out of range: {limit}")))?,
        None => -1,
    };
    let offset = i64::try_from(offset)
        .map_err(|_| SqliteStoreError::Invalid(format!("offset out of range: {offset}")))?;
    sql.push_str(&format!(" LIMIT {limit} OFFSET {offset}"));
    Ok(())
}

// ============================================================================
// SECTION: Inherent Operations
// ============================================================================

impl SqliteSessionStore {
    /// Opens a session row for an endpoint.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError::ActiveSession`] when the endpoint already
    /// has an active session.
    pub fn open_session(
        &self,
        endpoint: &EnvironmentEndpoint,
        platform: &PlatformInfo,
        started: &Timestamp,
    ) -> Result<i64, SqliteStoreError> {
        let guard = self.locked()?;
        let result = guard.execute(
            "INSERT INTO session (session_start, env_ip, env_port, os_system, os_release, \
             os_version, machine, processor, runtime_build, runtime_compiler, \
             runtime_implementation, runtime_version) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
            params![
                stored_timestamp(started)?,
                endpoint.ip,
                i64::from(endpoint.port),
                platform.os.system,
                platform.os.release,
                platform.os.version,
                platform.machine,
                platform.processor,
                platform.runtime.build,
                platform.runtime.compiler,
                platform.runtime.implementation,
                platform.runtime.version,
            ],
        );
        match result {
            Ok(_) => Ok(guard.last_insert_rowid()),
            Err(rusqlite::Error::SqliteFailure(failure, message))
                if failure.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                let active: Option<i64> = guard
                    .query_row(
                        "SELECT id FROM session WHERE env_ip = ?1 AND env_port = ?2 \
                         AND session_end IS NULL",
                        params![endpoint.ip, i64::from(endpoint.port)],
                        |row| row.get(0),
                    )
                    .optional()
                    .map_err(|err| db_err(&err))?;
                active.map_or_else(
                    || {
                        Err(SqliteStoreError::Db(
                            message.unwrap_or_else(|| "constraint violation".to_string()),
                        ))
                    },
                    |id| Err(SqliteStoreError::ActiveSession(id)),
                )
            }
            Err(err) => Err(db_err(&err)),
        }
    }

    /// Closes a session; closing an already-closed session is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError::NotFound`] when the session does not exist.
    pub fn close_session(&self, session_id: i64, ended: &Timestamp) -> Result<(), SqliteStoreError> {
        let guard = self.locked()?;
        let changed = guard
            .execute(
                "UPDATE session SET session_end = ?1 WHERE id = ?2 AND session_end IS NULL",
                params![stored_timestamp(ended)?, session_id],
            )
            .map_err(|err| db_err(&err))?;
        if changed == 0 {
            let exists: Option<i64> = guard
                .query_row("SELECT id FROM session WHERE id = ?1", params![session_id], |row| {
                    row.get(0)
                })
                .optional()
                .map_err(|err| db_err(&err))?;
            if exists.is_none() {
                return Err(SqliteStoreError::NotFound(format!("session {session_id}")));
            }
        }
        Ok(())
    }

    /// Returns the active session for an endpoint, if any.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError`] when the query fails.
    pub fn find_active(
        &self,
        endpoint: &EnvironmentEndpoint,
    ) -> Result<Option<SessionRecord>, SqliteStoreError> {
        let guard = self.locked()?;
        let raw = guard
            .query_row(
                &format!(
                    "SELECT {SESSION_COLUMNS} FROM session \
                     WHERE env_ip = ?1 AND env_port = ?2 AND session_end IS NULL"
                ),
                params![endpoint.ip, i64::from(endpoint.port)],
                read_raw_session,
            )
            .optional()
            .map_err(|err| db_err(&err))?;
        drop(guard);
        raw.map(convert_session).transpose()
    }

    /// Lists sessions matching the query.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError`] when the query fails or stored rows are
    /// invalid.
    pub fn list_sessions(
        &self,
        query: &SessionQuery,
    ) -> Result<Vec<SessionRecord>, SqliteStoreError> {
        let mut sql = format!("SELECT {SESSION_COLUMNS} FROM session WHERE 1 = 1");
        let mut parameters: Vec<Box<dyn ToSql>> = Vec::new();
        push_in_clause(&mut sql, &mut parameters, "id", &query.ids);
        push_in_clause(&mut sql, &mut parameters, "env_ip", &query.ips);
        let ports: Vec<i64> = query.ports.iter().map(|port| i64::from(*port)).collect();
        push_in_clause(&mut sql, &mut parameters, "env_port", &ports);
        push_in_clause(&mut sql, &mut parameters, "os_system", &query.systems);
        push_time_bound(&mut sql, &mut parameters, "session_start", ">=", query.started_after.as_ref())?;
        push_time_bound(&mut sql, &mut parameters, "session_start", "<=", query.started_before.as_ref())?;
        push_time_bound(&mut sql, &mut parameters, "session_end", ">=", query.closed_after.as_ref())?;
        push_time_bound(&mut sql, &mut parameters, "session_end", "<=", query.closed_before.as_ref())?;
        sql.push_str(&format!(
            " ORDER BY {} {}",
            session_order_column(query.order_by),
            arrange_keyword(query.arrange)
        ));
        push_window(&mut sql, query.limit, query.offset)?;

        let guard = self.locked()?;
        let mut statement = guard.prepare(&sql).map_err(|err| db_err(&err))?;
        let rows = statement
            .query_map(params_from_iter(parameters.iter().map(AsRef::as_ref)), read_raw_session)
            .map_err(|err| db_err(&err))?;
        let mut sessions = Vec::new();
        for row in rows {
            sessions.push(convert_session(row.map_err(|err| db_err(&err))?)?);
        }
        Ok(sessions)
    }

    /// Returns one session with nested executions and reports.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError`] when the query fails.
    pub fn session_detail(
        &self,
        session_id: i64,
    ) -> Result<Option<SessionDetail>, SqliteStoreError> {
        let guard = self.locked()?;
        let raw = guard
            .query_row(
                &format!("SELECT {SESSION_COLUMNS} FROM session WHERE id = ?1"),
                params![session_id],
                read_raw_session,
            )
            .optional()
            .map_err(|err| db_err(&err))?;
        let Some(raw) = raw else {
            return Ok(None);
        };

        let mut statement = guard
            .prepare(
                "SELECT id, timestamp_registered FROM execution \
                 WHERE fk_session = ?1 ORDER BY id ASC",
            )
            .map_err(|err| db_err(&err))?;
        let rows = statement
            .query_map(params![session_id], |row| {
                let id: i64 = row.get(0)?;
                let registered: String = row.get(1)?;
                Ok((id, registered))
            })
            .map_err(|err| db_err(&err))?;
        let mut executions = Vec::new();
        for row in rows {
            let (id, registered) = row.map_err(|err| db_err(&err))?;
            executions.push(ExecutionDetail {
                execution: ExecutionRecord {
                    id,
                    fk_session: session_id,
                    timestamp_registered: Timestamp::parse(&registered)
                        .map_err(|err| SqliteStoreError::Invalid(err.to_string()))?,
                },
                reports: Vec::new(),
            });
        }
        drop(statement);

        for detail in &mut executions {
            detail.reports = fetch_reports(&guard, detail.execution.id)?;
        }
        drop(guard);
        Ok(Some(SessionDetail {
            session: convert_session(raw)?,
            executions,
        }))
    }

    /// Deletes a finished session; cascades remove its executions and reports.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError::ActiveSession`] for active sessions and
    /// [`SqliteStoreError::NotFound`] for missing ones.
    pub fn delete_session(&self, session_id: i64) -> Result<(), SqliteStoreError> {
        let guard = self.locked()?;
        let session_end: Option<Option<String>> = guard
            .query_row(
                "SELECT session_end FROM session WHERE id = ?1",
                params![session_id],
                |row| row.get(0),
            )
            .optional()
            .map_err(|err| db_err(&err))?;
        match session_end {
            None => Err(SqliteStoreError::NotFound(format!("session {session_id}"))),
            Some(None) => Err(SqliteStoreError::ActiveSession(session_id)),
            Some(Some(_)) => {
                guard
                    .execute("DELETE FROM session WHERE id = ?1", params![session_id])
                    .map_err(|err| db_err(&err))?;
                Ok(())
            }
        }
    }

    /// Opens an execution under a session.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError::NotFound`] when the session is missing.
    pub fn open_execution(
        &self,
        session_id: i64,
        registered: &Timestamp,
    ) -> Result<i64, SqliteStoreError> {
        let guard = self.locked()?;
        let exists: Option<i64> = guard
            .query_row("SELECT id FROM session WHERE id = ?1", params![session_id], |row| {
                row.get(0)
            })
            .optional()
            .map_err(|err| db_err(&err))?;
        if exists.is_none() {
            return Err(SqliteStoreError::NotFound(format!("session {session_id}")));
        }
        guard
            .execute(
                "INSERT INTO execution (fk_session, timestamp_registered) VALUES (?1, ?2)",
                params![session_id, stored_timestamp(registered)?],
            )
            .map_err(|err| db_err(&err))?;
        Ok(guard.last_insert_rowid())
    }

    /// Persists the reports of one execution in a single transaction.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError`] when any insert fails; nothing is kept in
    /// that case.
    pub fn record_reports(
        &self,
        execution_id: i64,
        reports: &[TestReport],
    ) -> Result<(), SqliteStoreError> {
        let mut guard = self.locked()?;
        let tx = guard.transaction().map_err(|err| db_err(&err))?;
        for report in reports {
            let additional_info = report
                .additional_info
                .as_ref()
                .map(serde_json::to_string)
                .transpose()
                .map_err(|err| SqliteStoreError::Invalid(err.to_string()))?;
            tx.execute(
                "INSERT INTO report (fk_execution, test_name, test_description, result_code, \
                 timestamp_start, timestamp_end, additional_info) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    execution_id,
                    report.test_name,
                    report.test_description,
                    report.result_code,
                    stored_timestamp(&report.timestamp_start)?,
                    stored_timestamp(&report.timestamp_end)?,
                    additional_info,
                ],
            )
            .map_err(|err| db_err(&err))?;
        }
        tx.commit().map_err(|err| db_err(&err))
    }

    /// Lists executions matching the query.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError`] when the query fails.
    pub fn list_executions(
        &self,
        query: &ExecutionQuery,
    ) -> Result<Vec<ExecutionRecord>, SqliteStoreError> {
        let mut sql =
            "SELECT id, fk_session, timestamp_registered FROM execution WHERE 1 = 1".to_string();
        let mut parameters: Vec<Box<dyn ToSql>> = Vec::new();
        push_in_clause(&mut sql, &mut parameters, "id", &query.ids);
        push_in_clause(&mut sql, &mut parameters, "fk_session", &query.sessions);
        push_time_bound(&mut sql, &mut parameters, "timestamp_registered", ">=", query.registered_after.as_ref())?;
        push_time_bound(&mut sql, &mut parameters, "timestamp_registered", "<=", query.registered_before.as_ref())?;
        sql.push_str(&format!(
            " ORDER BY {} {}",
            execution_order_column(query.order_by),
            arrange_keyword(query.arrange)
        ));
        push_window(&mut sql, query.limit, query.offset)?;

        let guard = self.locked()?;
        let mut statement = guard.prepare(&sql).map_err(|err| db_err(&err))?;
        let rows = statement
            .query_map(params_from_iter(parameters.iter().map(AsRef::as_ref)), |row| {
                let id: i64 = row.get(0)?;
                let fk_session: i64 = row.get(1)?;
                let registered: String = row.get(2)?;
                Ok((id, fk_session, registered))
            })
            .map_err(|err| db_err(&err))?;
        let mut executions = Vec::new();
        for row in rows {
            let (id, fk_session, registered) = row.map_err(|err| db_err(&err))?;
            executions.push(ExecutionRecord {
                id,
                fk_session,
                timestamp_registered: Timestamp::parse(&registered)
                    .map_err(|err| SqliteStoreError::Invalid(err.to_string()))?,
            });
        }
        Ok(executions)
    }
}

/// Fetches the report rows of one execution in insertion order.
fn fetch_reports(
    connection: &Connection,
    execution_id: i64,
) -> Result<Vec<ReportRecord>, SqliteStoreError> {
    let mut statement = connection
        .prepare(
            "SELECT id, test_name, test_description, result_code, timestamp_start, \
             timestamp_end, additional_info FROM report \
             WHERE fk_execution = ?1 ORDER BY id ASC",
        )
        .map_err(|err| db_err(&err))?;
    let rows = statement
        .query_map(params![execution_id], |row| {
            let id: i64 = row.get(0)?;
            let test_name: String = row.get(1)?;
            let test_description: String = row.get(2)?;
            let result_code: i64 = row.get(3)?;
            let timestamp_start: String = row.get(4)?;
            let timestamp_end: String = row.get(5)?;
            let additional_info: Option<String> = row.get(6)?;
            Ok((id, test_name, test_description, result_code, timestamp_start, timestamp_end, additional_info))
        })
        .map_err(|err| db_err(&err))?;
    let mut reports = Vec::new();
    for row in rows {
        let (id, test_name, test_description, result_code, start, end, info) =
            row.map_err(|err| db_err(&err))?;
        let additional_info = info
            .as_deref()
            .map(serde_json::from_str::<BTreeMap<String, Value>>)
            .transpose()
            .map_err(|err| SqliteStoreError::Invalid(err.to_string()))?;
        reports.push(ReportRecord {
            id,
            fk_execution: execution_id,
            report: TestReport {
                test_name,
                test_description,
                result_code,
                timestamp_start: Timestamp::parse(&start)
                    .map_err(|err| SqliteStoreError::Invalid(err.to_string()))?,
                timestamp_end: Timestamp::parse(&end)
                    .map_err(|err| SqliteStoreError::Invalid(err.to_string()))?,
                additional_info,
            },
        });
    }
    Ok(reports)
}

// ============================================================================
// SECTION: Trait Implementation
// ============================================================================

impl SessionStore for SqliteSessionStore {
    fn open_session(
        &self,
        endpoint: &EnvironmentEndpoint,
        platform: &PlatformInfo,
        started: &Timestamp,
    ) -> Result<i64, StoreError> {
        Self::open_session(self, endpoint, platform, started).map_err(StoreError::from)
    }

    fn close_session(&self, session_id: i64, ended: &Timestamp) -> Result<(), StoreError> {
        Self::close_session(self, session_id, ended).map_err(StoreError::from)
    }

    fn find_active(
        &self,
        endpoint: &EnvironmentEndpoint,
    ) -> Result<Option<SessionRecord>, StoreError> {
        Self::find_active(self, endpoint).map_err(StoreError::from)
    }

    fn list_sessions(&self, query: &SessionQuery) -> Result<Vec<SessionRecord>, StoreError> {
        Self::list_sessions(self, query).map_err(StoreError::from)
    }

    fn session_detail(&self, session_id: i64) -> Result<Option<SessionDetail>, StoreError> {
        Self::session_detail(self, session_id).map_err(StoreError::from)
    }

    fn delete_session(&self, session_id: i64) -> Result<(), StoreError> {
        Self::delete_session(self, session_id).map_err(StoreError::from)
    }

    fn open_execution(&self, session_id: i64, registered: &Timestamp) -> Result<i64, StoreError> {
        Self::open_execution(self, session_id, registered).map_err(StoreError::from)
    }

    fn record_reports(&self, execution_id: i64, reports: &[TestReport]) -> Result<(), StoreError> {
        Self::record_reports(self, execution_id, reports).map_err(StoreError::from)
    }

    fn list_executions(&self, query: &ExecutionQuery) -> Result<Vec<ExecutionRecord>, StoreError> {
        Self::list_executions(self, query).map_err(StoreError::from)
    }
}
