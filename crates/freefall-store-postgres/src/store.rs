// crates/freefall-store-postgres/src/store.rs
// ============================================================================
// Module: Postgres Reading Store
// Description: Pooled PostgreSQL reading store and per-request sessions.
// Purpose: Persist validated sensor readings into the `freefall_data` table.
// Dependencies: freefall-core, postgres, r2d2, r2d2_postgres, serde, thiserror
// ============================================================================

//! ## Overview
//! Values are bound as 64-bit integers and floats and narrowed by the server
//! into the `INTEGER` and `REAL` columns, so an out-of-range value fails only
//! its own insert. Server errors are classified by SQLSTATE: connection and
//! resource classes abort the request, schema classes are reported as schema
//! failures, and everything else is scoped to the row.
//!
//! The synchronous `postgres` client drives its own runtime, so every call
//! into this module must happen off the async executor.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;
use std::time::Duration;

use freefall_core::ReadingSession;
use freefall_core::ReadingStore;
use freefall_core::SensorReading;
use freefall_core::SinkError;
use postgres::NoTls;
use r2d2::Pool;
use r2d2::PooledConnection;
use r2d2_postgres::PostgresConnectionManager;
use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default server host.
const DEFAULT_HOST: &str = "localhost";
/// Default server port.
const DEFAULT_PORT: u16 = 5432;
/// Default database name.
const DEFAULT_DATABASE: &str = "freefall";
/// Default role name.
const DEFAULT_USER: &str = "postgres";
/// Default pool size.
const DEFAULT_MAX_CONNECTIONS: u32 = 16;
/// Default connect and acquisition timeout (ms).
const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 5_000;
/// Default per-statement timeout (ms).
const DEFAULT_STATEMENT_TIMEOUT_MS: u64 = 30_000;
/// Upper bound on the connect timeout used by reachability probes (ms).
const MAX_PROBE_TIMEOUT_MS: u64 = 5_000;
/// Application name reported to the server.
const APPLICATION_NAME: &str = "freefall";

/// Idempotent table definition; column order matches the wire order.
const CREATE_TABLE_SQL: &str = "CREATE TABLE IF NOT EXISTS freefall_data (session_id INTEGER, \
                                timestamp BIGINT, accelX REAL, accelY REAL, accelZ REAL, gyroX \
                                REAL, gyroY REAL, gyroZ REAL, posX REAL, posY REAL, posZ REAL);";

/// Single-row insert; casts fix the bound parameter types at 64 bits.
const INSERT_SQL: &str = "INSERT INTO freefall_data (session_id, timestamp, accelX, accelY, \
                          accelZ, gyroX, gyroY, gyroZ, posX, posY, posZ) VALUES ($1::int8, \
                          $2::int8, $3::float8, $4::float8, $5::float8, $6::float8, $7::float8, \
                          $8::float8, $9::float8, $10::float8, $11::float8)";

/// SQLSTATE class prefixes that mean the connection or server is unusable.
const UNAVAILABLE_SQLSTATE_CLASSES: [&str; 4] = ["08", "53", "57", "58"];
/// SQLSTATE class prefix for syntax and undefined-object errors.
const SCHEMA_SQLSTATE_CLASS: &str = "42";

// ============================================================================
// SECTION: Config
// ============================================================================

/// Postgres store configuration.
///
/// # Invariants
/// - `password` has no default; it must come from the config file or the
///   environment.
/// - Timeouts are milliseconds and must be greater than zero.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PostgresStoreConfig {
    /// Server host name or address.
    #[serde(default = "default_host")]
    pub host: String,
    /// Server port.
    #[serde(default = "default_port")]
    pub port: u16,
    /// Database name.
    #[serde(default = "default_database")]
    pub database: String,
    /// Role name.
    #[serde(default = "default_user")]
    pub user: String,
    /// Role password.
    #[serde(default)]
    pub password: Option<String>,
    /// Maximum pool size.
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    /// Connect and pool acquisition timeout in milliseconds.
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    /// Statement timeout in milliseconds.
    #[serde(default = "default_statement_timeout_ms")]
    pub statement_timeout_ms: u64,
}

impl Default for PostgresStoreConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: DEFAULT_PORT,
            database: default_database(),
            user: default_user(),
            password: None,
            max_connections: DEFAULT_MAX_CONNECTIONS,
            connect_timeout_ms: DEFAULT_CONNECT_TIMEOUT_MS,
            statement_timeout_ms: DEFAULT_STATEMENT_TIMEOUT_MS,
        }
    }
}

impl fmt::Debug for PostgresStoreConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PostgresStoreConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("max_connections", &self.max_connections)
            .field("connect_timeout_ms", &self.connect_timeout_ms)
            .field("statement_timeout_ms", &self.statement_timeout_ms)
            .finish()
    }
}

impl PostgresStoreConfig {
    /// Validates connection settings.
    ///
    /// # Errors
    ///
    /// Returns [`PostgresStoreError::Invalid`] when a setting is empty or zero.
    pub fn validate(&self) -> Result<(), PostgresStoreError> {
        if self.host.trim().is_empty() {
            return Err(PostgresStoreError::Invalid("host must not be empty".to_string()));
        }
        if self.port == 0 {
            return Err(PostgresStoreError::Invalid("port must be greater than zero".to_string()));
        }
        if self.database.trim().is_empty() {
            return Err(PostgresStoreError::Invalid("database must not be empty".to_string()));
        }
        if self.user.trim().is_empty() {
            return Err(PostgresStoreError::Invalid("user must not be empty".to_string()));
        }
        if self.max_connections == 0 {
            return Err(PostgresStoreError::Invalid(
                "max_connections must be greater than zero".to_string(),
            ));
        }
        if self.connect_timeout_ms == 0 || self.statement_timeout_ms == 0 {
            return Err(PostgresStoreError::Invalid(
                "timeouts must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Builds client settings with the given connect timeout.
    fn client_config(&self, connect_timeout_ms: u64) -> postgres::Config {
        let mut pg_config = postgres::Config::new();
        pg_config
            .host(&self.host)
            .port(self.port)
            .dbname(&self.database)
            .user(&self.user)
            .application_name(APPLICATION_NAME)
            .connect_timeout(Duration::from_millis(connect_timeout_ms));
        if let Some(password) = &self.password {
            pg_config.password(password);
        }
        let options = format!("-c statement_timeout={}", self.statement_timeout_ms);
        pg_config.options(&options);
        pg_config
    }
}

/// Default host for serde.
fn default_host() -> String {
    DEFAULT_HOST.to_string()
}

/// Default port for serde.
const fn default_port() -> u16 {
    DEFAULT_PORT
}

/// Default database for serde.
fn default_database() -> String {
    DEFAULT_DATABASE.to_string()
}

/// Default user for serde.
fn default_user() -> String {
    DEFAULT_USER.to_string()
}

/// Default pool size for serde.
const fn default_max_connections() -> u32 {
    DEFAULT_MAX_CONNECTIONS
}

/// Default connect timeout for serde.
const fn default_connect_timeout_ms() -> u64 {
    DEFAULT_CONNECT_TIMEOUT_MS
}

/// Default statement timeout for serde.
const fn default_statement_timeout_ms() -> u64 {
    DEFAULT_STATEMENT_TIMEOUT_MS
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Postgres store errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PostgresStoreError {
    /// Postgres or pool error.
    #[error("postgres store error: {0}")]
    Postgres(String),
    /// Invalid store configuration.
    #[error("postgres store invalid config: {0}")]
    Invalid(String),
}

impl From<PostgresStoreError> for SinkError {
    fn from(error: PostgresStoreError) -> Self {
        match error {
            PostgresStoreError::Postgres(message) => Self::Unavailable(message),
            PostgresStoreError::Invalid(message) => Self::Schema(message),
        }
    }
}

// ============================================================================
// SECTION: Store
// ============================================================================

/// Connection pool type used by the store.
type PgPool = Pool<PostgresConnectionManager<NoTls>>;

/// PostgreSQL-backed reading store.
pub struct PostgresReadingStore {
    /// Connection pool; taken on drop.
    pool: Option<PgPool>,
    /// Client settings for out-of-pool reachability probes.
    probe_config: postgres::Config,
}

impl Drop for PostgresReadingStore {
    fn drop(&mut self) {
        if let Some(pool) = self.pool.take() {
            let _ = std::thread::spawn(move || drop(pool));
        }
    }
}

impl PostgresReadingStore {
    /// Creates a store and fills the connection pool.
    ///
    /// # Errors
    ///
    /// Returns [`PostgresStoreError`] when the config is invalid or no
    /// connection can be established within the connect timeout.
    pub fn new(config: &PostgresStoreConfig) -> Result<Self, PostgresStoreError> {
        config.validate()?;
        let manager =
            PostgresConnectionManager::new(config.client_config(config.connect_timeout_ms), NoTls);
        let pool = Pool::builder()
            .max_size(config.max_connections)
            .min_idle(Some(1))
            .connection_timeout(Duration::from_millis(config.connect_timeout_ms))
            .build(manager)
            .map_err(|err| PostgresStoreError::Postgres(err.to_string()))?;
        let probe_timeout = config.connect_timeout_ms.min(MAX_PROBE_TIMEOUT_MS);
        Ok(Self {
            pool: Some(pool),
            probe_config: config.client_config(probe_timeout),
        })
    }

    /// Borrows a pooled connection.
    fn connection(
        &self,
    ) -> Result<PooledConnection<PostgresConnectionManager<NoTls>>, SinkError> {
        self.pool
            .as_ref()
            .ok_or_else(|| SinkError::Unavailable("postgres store closed".to_string()))?
            .get()
            .map_err(|err| SinkError::Unavailable(err.to_string()))
    }
}

impl ReadingStore for PostgresReadingStore {
    fn ensure_schema(&self) -> Result<(), SinkError> {
        let mut conn = self.connection()?;
        conn.batch_execute(CREATE_TABLE_SQL).map_err(|err| match classify_error(&err) {
            unavailable @ SinkError::Unavailable(_) => unavailable,
            _ => SinkError::Schema(err.to_string()),
        })
    }

    fn open_session(&self) -> Result<Box<dyn ReadingSession>, SinkError> {
        Ok(Box::new(PostgresSession {
            conn: self.connection()?,
            in_batch: false,
        }))
    }

    fn reachable(&self) -> Result<(), SinkError> {
        let client = self
            .probe_config
            .connect(NoTls)
            .map_err(|err| SinkError::Unavailable(err.to_string()))?;
        client.close().map_err(|err| SinkError::Unavailable(err.to_string()))
    }
}

// ============================================================================
// SECTION: Session
// ============================================================================

/// One request's pooled connection.
struct PostgresSession {
    /// Borrowed connection; returned to the pool on drop.
    conn: PooledConnection<PostgresConnectionManager<NoTls>>,
    /// True while an explicit batch transaction is open.
    in_batch: bool,
}

impl ReadingSession for PostgresSession {
    fn persist(&mut self, reading: &SensorReading) -> Result<(), SinkError> {
        let [accel_x, accel_y, accel_z, gyro_x, gyro_y, gyro_z, pos_x, pos_y, pos_z] =
            reading.measurements();
        self.conn
            .execute(
                INSERT_SQL,
                &[
                    &reading.session_id,
                    &reading.timestamp,
                    &accel_x,
                    &accel_y,
                    &accel_z,
                    &gyro_x,
                    &gyro_y,
                    &gyro_z,
                    &pos_x,
                    &pos_y,
                    &pos_z,
                ],
            )
            .map_err(|err| classify_error(&err))?;
        Ok(())
    }

    fn begin_batch(&mut self) -> Result<(), SinkError> {
        self.conn.batch_execute("BEGIN").map_err(|err| classify_error(&err))?;
        self.in_batch = true;
        Ok(())
    }

    fn commit_batch(&mut self) -> Result<(), SinkError> {
        self.in_batch = false;
        self.conn.batch_execute("COMMIT").map_err(|err| classify_error(&err))
    }

    fn rollback_batch(&mut self) -> Result<(), SinkError> {
        self.in_batch = false;
        self.conn.batch_execute("ROLLBACK").map_err(|err| classify_error(&err))
    }
}

impl Drop for PostgresSession {
    fn drop(&mut self) {
        if self.in_batch {
            let _ = self.conn.batch_execute("ROLLBACK");
        }
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Classifies a client error as connection-level, schema-level, or row-level.
fn classify_error(err: &postgres::Error) -> SinkError {
    if err.is_closed() {
        return SinkError::Unavailable(err.to_string());
    }
    let Some(state) = err.code() else {
        return SinkError::Unavailable(err.to_string());
    };
    classify_sqlstate(state.code(), err.to_string())
}

/// Maps a SQLSTATE code to a sink error class.
fn classify_sqlstate(code: &str, message: String) -> SinkError {
    if UNAVAILABLE_SQLSTATE_CLASSES.iter().any(|class| code.starts_with(class)) {
        SinkError::Unavailable(message)
    } else if code.starts_with(SCHEMA_SQLSTATE_CLASS) {
        SinkError::Schema(message)
    } else {
        SinkError::RowRejected(message)
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================
