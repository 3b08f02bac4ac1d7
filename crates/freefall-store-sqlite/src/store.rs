// crates/freefall-store-sqlite/src/store.rs
// ============================================================================
// Module: SQLite Reading Store
// Description: Reading store and per-request sessions backed by SQLite WAL.
// Purpose: Persist validated sensor readings into the `freefall_data` table.
// Dependencies: freefall-core, rusqlite, serde, thiserror
// ============================================================================

//! ## Overview
//! [`SqliteReadingStore`] keeps only its configuration; every session,
//! schema call, and reachability probe opens a fresh connection with the
//! configured pragmas. Outside a batch each insert runs in autocommit mode,
//! so a failing row never disturbs its neighbours. Engine errors are
//! classified into connection-level and row-level failures.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::path::Path;
use std::path::PathBuf;
use std::time::Duration;

use freefall_core::ReadingSession;
use freefall_core::ReadingStore;
use freefall_core::SensorReading;
use freefall_core::SinkError;
use rusqlite::Connection;
use rusqlite::ErrorCode;
use rusqlite::OpenFlags;
use rusqlite::params;
use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default busy timeout (ms).
const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;
/// Upper bound on the busy timeout used by reachability probes (ms).
const MAX_PROBE_TIMEOUT_MS: u64 = 5_000;
/// Maximum length of a single path component.
const MAX_PATH_COMPONENT_LENGTH: usize = 255;
/// Maximum total path length.
const MAX_TOTAL_PATH_LENGTH: usize = 4096;

/// Idempotent table definition; column order matches the wire order.
const CREATE_TABLE_SQL: &str = "CREATE TABLE IF NOT EXISTS freefall_data (
    session_id INTEGER,
    timestamp BIGINT,
    accelX REAL,
    accelY REAL,
    accelZ REAL,
    gyroX REAL,
    gyroY REAL,
    gyroZ REAL,
    posX REAL,
    posY REAL,
    posZ REAL
);";

/// Single-row insert statement.
const INSERT_SQL: &str = "INSERT INTO freefall_data (
    session_id, timestamp, accelX, accelY, accelZ,
    gyroX, gyroY, gyroZ, posX, posY, posZ
) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)";

// ============================================================================
// SECTION: Config
// ============================================================================

/// `SQLite` journal mode configuration.
///
/// # Invariants
/// - Values map 1:1 to `SQLite` `journal_mode` pragma settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SqliteJournalMode {
    /// WAL journal mode (recommended).
    #[default]
    Wal,
    /// Delete journal mode.
    Delete,
}

impl SqliteJournalMode {
    /// Returns the `SQLite` pragma value.
    #[must_use]
    pub const fn pragma_value(self) -> &'static str {
        match self {
            Self::Wal => "wal",
            Self::Delete => "delete",
        }
    }
}

/// `SQLite` sync mode configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SqliteSyncMode {
    /// Full synchronous mode (safest).
    #[default]
    Full,
    /// Normal synchronous mode (balanced).
    Normal,
}

impl SqliteSyncMode {
    /// Returns the `SQLite` pragma value.
    #[must_use]
    pub const fn pragma_value(self) -> &'static str {
        match self {
            Self::Full => "full",
            Self::Normal => "normal",
        }
    }
}

/// Configuration for the `SQLite` reading store.
///
/// # Invariants
/// - `path` must resolve to a file path (not a directory).
/// - `busy_timeout_ms` is interpreted as milliseconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SqliteStoreConfig {
    /// Path to the `SQLite` database file.
    pub path: PathBuf,
    /// Busy timeout in milliseconds.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
    /// `SQLite` journal mode.
    #[serde(default)]
    pub journal_mode: SqliteJournalMode,
    /// `SQLite` sync mode.
    #[serde(default)]
    pub sync_mode: SqliteSyncMode,
}

impl SqliteStoreConfig {
    /// Creates a config for `path` with default pragmas.
    #[must_use]
    pub fn for_path(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
            journal_mode: SqliteJournalMode::default(),
            sync_mode: SqliteSyncMode::default(),
        }
    }

    /// Validates path safety limits.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError::Invalid`] when the path is empty, too
    /// long, or names a directory.
    pub fn validate(&self) -> Result<(), SqliteStoreError> {
        validate_store_path(&self.path)
    }
}

/// Default busy timeout for serde.
const fn default_busy_timeout_ms() -> u64 {
    DEFAULT_BUSY_TIMEOUT_MS
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// `SQLite` store errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SqliteStoreError {
    /// Store I/O error.
    #[error("sqlite store io error: {0}")]
    Io(String),
    /// `SQLite` engine error.
    #[error("sqlite store db error: {0}")]
    Db(String),
    /// Invalid store configuration.
    #[error("sqlite store invalid config: {0}")]
    Invalid(String),
}

impl From<SqliteStoreError> for SinkError {
    fn from(error: SqliteStoreError) -> Self {
        match error {
            SqliteStoreError::Io(message) | SqliteStoreError::Db(message) => {
                Self::Unavailable(message)
            }
            SqliteStoreError::Invalid(message) => Self::Schema(message),
        }
    }
}

// ============================================================================
// SECTION: Store
// ============================================================================

/// SQLite-backed reading store.
#[derive(Debug, Clone)]
pub struct SqliteReadingStore {
    /// Store configuration.
    config: SqliteStoreConfig,
}

impl SqliteReadingStore {
    /// Creates a store, validating the path and creating its parent directory.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError`] when the path is invalid or the database
    /// cannot be opened.
    pub fn new(config: SqliteStoreConfig) -> Result<Self, SqliteStoreError> {
        config.validate()?;
        ensure_parent_dir(&config.path)?;
        drop(open_connection(&config, config.busy_timeout_ms)?);
        Ok(Self {
            config,
        })
    }

    /// Returns the store configuration.
    #[must_use]
    pub const fn config(&self) -> &SqliteStoreConfig {
        &self.config
    }
}

impl ReadingStore for SqliteReadingStore {
    fn ensure_schema(&self) -> Result<(), SinkError> {
        let connection = open_connection(&self.config, self.config.busy_timeout_ms)?;
        connection
            .execute_batch(CREATE_TABLE_SQL)
            .map_err(|err| SinkError::Schema(err.to_string()))
    }

    fn open_session(&self) -> Result<Box<dyn ReadingSession>, SinkError> {
        let connection = open_connection(&self.config, self.config.busy_timeout_ms)?;
        Ok(Box::new(SqliteSession {
            connection,
            in_batch: false,
        }))
    }

    fn reachable(&self) -> Result<(), SinkError> {
        let timeout = self.config.busy_timeout_ms.min(MAX_PROBE_TIMEOUT_MS);
        let connection = open_connection(&self.config, timeout)?;
        connection
            .query_row("SELECT 1", params![], |row| row.get::<_, i64>(0))
            .map_err(|err| SinkError::Unavailable(err.to_string()))?;
        Ok(())
    }
}

// ============================================================================
// SECTION: Session
// ============================================================================

/// One request's dedicated `SQLite` connection.
struct SqliteSession {
    /// Open connection; closed on drop.
    connection: Connection,
    /// True while an explicit batch transaction is open.
    in_batch: bool,
}

impl ReadingSession for SqliteSession {
    fn persist(&mut self, reading: &SensorReading) -> Result<(), SinkError> {
        let mut statement = self.connection.prepare_cached(INSERT_SQL).map_err(classify_error)?;
        statement
            .execute(params![
                reading.session_id,
                reading.timestamp,
                reading.accel_x,
                reading.accel_y,
                reading.accel_z,
                reading.gyro_x,
                reading.gyro_y,
                reading.gyro_z,
                reading.pos_x,
                reading.pos_y,
                reading.pos_z,
            ])
            .map_err(classify_error)?;
        Ok(())
    }

    fn begin_batch(&mut self) -> Result<(), SinkError> {
        self.connection.execute_batch("BEGIN IMMEDIATE;").map_err(classify_error)?;
        self.in_batch = true;
        Ok(())
    }

    fn commit_batch(&mut self) -> Result<(), SinkError> {
        self.connection.execute_batch("COMMIT;").map_err(classify_error)?;
        self.in_batch = false;
        Ok(())
    }

    fn rollback_batch(&mut self) -> Result<(), SinkError> {
        self.in_batch = false;
        self.connection.execute_batch("ROLLBACK;").map_err(classify_error)
    }
}

impl Drop for SqliteSession {
    fn drop(&mut self) {
        if self.in_batch {
            let _ = self.connection.execute_batch("ROLLBACK;");
        }
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Classifies an engine error as connection-level or row-level.
fn classify_error(err: rusqlite::Error) -> SinkError {
    match err.sqlite_error_code() {
        Some(
            ErrorCode::CannotOpen
            | ErrorCode::SystemIoFailure
            | ErrorCode::NotADatabase
            | ErrorCode::DatabaseCorrupt
            | ErrorCode::DatabaseBusy
            | ErrorCode::DatabaseLocked
            | ErrorCode::DiskFull
            | ErrorCode::ReadOnly
            | ErrorCode::PermissionDenied,
        ) => SinkError::Unavailable(err.to_string()),
        Some(ErrorCode::Unknown) => SinkError::Schema(err.to_string()),
        _ => SinkError::RowRejected(err.to_string()),
    }
}

/// Ensures the parent directory for the store exists.
fn ensure_parent_dir(path: &Path) -> Result<(), SqliteStoreError> {
    let Some(parent) = path.parent() else {
        return Err(SqliteStoreError::Io("store path missing parent directory".to_string()));
    };
    if parent.as_os_str().is_empty() {
        return Ok(());
    }
    std::fs::create_dir_all(parent).map_err(|err| SqliteStoreError::Io(err.to_string()))
}

/// Validates store paths for safety limits.
fn validate_store_path(path: &Path) -> Result<(), SqliteStoreError> {
    if path.as_os_str().is_empty() {
        return Err(SqliteStoreError::Invalid("store path must not be empty".to_string()));
    }
    let path_string = path.display().to_string();
    if path_string.len() > MAX_TOTAL_PATH_LENGTH {
        return Err(SqliteStoreError::Invalid("store path exceeds length limit".to_string()));
    }
    for component in path.components() {
        let name = component.as_os_str().to_string_lossy();
        if name.len() > MAX_PATH_COMPONENT_LENGTH {
            return Err(SqliteStoreError::Invalid(
                "store path contains an overlong component".to_string(),
            ));
        }
    }
    if path.is_dir() {
        return Err(SqliteStoreError::Invalid(
            "store path must be a file, not a directory".to_string(),
        ));
    }
    Ok(())
}

/// Opens an `SQLite` connection with the configured pragmas.
fn open_connection(
    config: &SqliteStoreConfig,
    busy_timeout_ms: u64,
) -> Result<Connection, SqliteStoreError> {
    let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
        | OpenFlags::SQLITE_OPEN_CREATE
        | OpenFlags::SQLITE_OPEN_FULL_MUTEX;
    let connection = Connection::open_with_flags(&config.path, flags)
        .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
    connection
        .busy_timeout(Duration::from_millis(busy_timeout_ms))
        .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
    connection
        .execute_batch(&format!("PRAGMA journal_mode = {};", config.journal_mode.pragma_value()))
        .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
    connection
        .execute_batch(&format!("PRAGMA synchronous = {};", config.sync_mode.pragma_value()))
        .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
    Ok(connection)
}
