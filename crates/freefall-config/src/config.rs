// crates/freefall-config/src/config.rs
// ============================================================================
// Module: Freefall Configuration
// Description: Configuration loading, environment overrides, and validation.
// Purpose: Provide strict, fail-closed config parsing with hard limits.
// Dependencies: freefall-core, freefall-store-postgres, freefall-store-sqlite, serde, toml
// ============================================================================

//! ## Overview
//! Configuration is loaded from a TOML file with strict size and path limits.
//! The file is resolved from an explicit path, then [`CONFIG_ENV_VAR`], then
//! [`DEFAULT_CONFIG_NAME`] in the working directory; only the last may be
//! absent, in which case built-in defaults apply. Database connection
//! settings can then be overridden from `DB_HOST`, `DB_PORT`, `DB_NAME`,
//! `DB_USER`, and `DB_PASSWORD` before validation runs.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::env;
use std::fs;
use std::net::SocketAddr;
use std::path::Path;
use std::path::PathBuf;

use freefall_core::CommitPolicy;
use freefall_store_postgres::PostgresStoreConfig;
use freefall_store_sqlite::SqliteStoreConfig;
use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default configuration filename when no path is specified.
pub const DEFAULT_CONFIG_NAME: &str = "freefall.toml";
/// Environment variable used to override the config path.
pub const CONFIG_ENV_VAR: &str = "FREEFALL_CONFIG";
/// Maximum configuration file size in bytes.
const MAX_CONFIG_FILE_SIZE: usize = 1024 * 1024;
/// Maximum length of a single path component.
const MAX_PATH_COMPONENT_LENGTH: usize = 255;
/// Maximum total path length.
const MAX_TOTAL_PATH_LENGTH: usize = 4096;
/// Default listener address.
const DEFAULT_BIND: &str = "0.0.0.0:5000";
/// Default maximum request body size in bytes.
const DEFAULT_MAX_BODY_BYTES: usize = 16 * 1024 * 1024;
/// Hard upper bound for the request body limit.
pub const MAX_BODY_BYTES_LIMIT: usize = 256 * 1024 * 1024;

/// Environment variable overriding the database host.
pub const ENV_DB_HOST: &str = "DB_HOST";
/// Environment variable overriding the database port.
pub const ENV_DB_PORT: &str = "DB_PORT";
/// Environment variable overriding the database name.
pub const ENV_DB_NAME: &str = "DB_NAME";
/// Environment variable overriding the database user.
pub const ENV_DB_USER: &str = "DB_USER";
/// Environment variable overriding the database password.
pub const ENV_DB_PASSWORD: &str = "DB_PASSWORD";

// ============================================================================
// SECTION: Config Model
// ============================================================================

/// Root configuration for the ingestion service.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FreefallConfig {
    /// HTTP listener configuration.
    #[serde(default)]
    pub server: ServerConfig,
    /// Storage backend configuration.
    #[serde(default)]
    pub storage: StorageConfig,
    /// Audit event configuration.
    #[serde(default)]
    pub audit: AuditConfig,
}

/// HTTP listener configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServerConfig {
    /// Socket address to bind.
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Maximum request body size in bytes.
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
        }
    }
}

impl ServerConfig {
    /// Parses the bind address.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] when the address does not parse.
    pub fn bind_addr(&self) -> Result<SocketAddr, ConfigError> {
        self.bind
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid(format!("invalid bind address: {}", self.bind)))
    }

    /// Validates listener settings.
    fn validate(&self) -> Result<(), ConfigError> {
        self.bind_addr()?;
        if self.max_body_bytes == 0 {
            return Err(ConfigError::Invalid(
                "max_body_bytes must be greater than zero".to_string(),
            ));
        }
        if self.max_body_bytes > MAX_BODY_BYTES_LIMIT {
            return Err(ConfigError::Invalid(format!(
                "max_body_bytes must not exceed {MAX_BODY_BYTES_LIMIT}"
            )));
        }
        Ok(())
    }
}

/// Storage backend selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum StorageBackend {
    /// Pooled PostgreSQL (production).
    #[default]
    Postgres,
    /// File-backed `SQLite` (local development).
    Sqlite,
    /// Process-local memory (demos and tests).
    Memory,
}

impl StorageBackend {
    /// Returns a stable label for the backend.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Postgres => "postgres",
            Self::Sqlite => "sqlite",
            Self::Memory => "memory",
        }
    }
}

/// Storage backend configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StorageConfig {
    /// Selected backend.
    #[serde(default)]
    pub backend: StorageBackend,
    /// Commit policy applied to each request.
    #[serde(default)]
    pub commit_policy: CommitPolicy,
    /// PostgreSQL settings, used when `backend = "postgres"`.
    #[serde(default)]
    pub postgres: PostgresStoreConfig,
    /// `SQLite` settings, required when `backend = "sqlite"`.
    #[serde(default)]
    pub sqlite: Option<SqliteStoreConfig>,
}

impl StorageConfig {
    /// Validates the selected backend's settings.
    fn validate(&self) -> Result<(), ConfigError> {
        match self.backend {
            StorageBackend::Postgres => self
                .postgres
                .validate()
                .map_err(|err| ConfigError::Invalid(format!("storage.postgres: {err}"))),
            StorageBackend::Sqlite => {
                let Some(sqlite) = &self.sqlite else {
                    return Err(ConfigError::Invalid(
                        "storage.sqlite is required for the sqlite backend".to_string(),
                    ));
                };
                validate_path(&sqlite.path)?;
                sqlite
                    .validate()
                    .map_err(|err| ConfigError::Invalid(format!("storage.sqlite: {err}")))
            }
            StorageBackend::Memory => Ok(()),
        }
    }
}

/// Audit sink selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AuditSinkKind {
    /// JSON lines on stderr.
    #[default]
    Stderr,
    /// JSON lines appended to `audit.path`.
    File,
    /// Discard audit events.
    None,
}

/// Audit event configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AuditConfig {
    /// Selected sink.
    #[serde(default)]
    pub sink: AuditSinkKind,
    /// Audit log path (JSON lines), required for the file sink.
    #[serde(default)]
    pub path: Option<String>,
}

impl AuditConfig {
    /// Validates audit configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        if let Some(path) = &self.path {
            validate_path_string("audit.path", path)?;
        }
        if self.sink == AuditSinkKind::File && self.path.is_none() {
            return Err(ConfigError::Invalid("audit.path is required for the file sink".to_string()));
        }
        Ok(())
    }
}

// ============================================================================
// SECTION: Loading
// ============================================================================

impl FreefallConfig {
    /// Loads configuration using the default resolution rules, applies
    /// environment overrides, and validates the result.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when loading or validation fails.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let source = resolve_path(path)?;
        let mut config = match source {
            ConfigSource::Explicit(path) => Self::read(&path)?,
            ConfigSource::Default(path) if path.exists() => Self::read(&path)?,
            ConfigSource::Default(_) => Self::default(),
        };
        config.apply_env_overrides_with(|key| env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Parses configuration from TOML text without validating it.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] when the text is not a valid config.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|err| ConfigError::Parse(err.to_string()))
    }

    /// Reads and parses one config file.
    fn read(path: &Path) -> Result<Self, ConfigError> {
        validate_path(path)?;
        let bytes = fs::read(path).map_err(|err| ConfigError::Io(err.to_string()))?;
        if bytes.len() > MAX_CONFIG_FILE_SIZE {
            return Err(ConfigError::Invalid("config file exceeds size limit".to_string()));
        }
        let content = std::str::from_utf8(&bytes)
            .map_err(|_| ConfigError::Invalid("config file must be utf-8".to_string()))?;
        Self::from_toml(content)
    }

    /// Applies database overrides from a variable lookup.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] when `DB_PORT` is not a port number.
    pub fn apply_env_overrides_with(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        let postgres = &mut self.storage.postgres;
        if let Some(host) = lookup(ENV_DB_HOST) {
            postgres.host = host;
        }
        if let Some(port) = lookup(ENV_DB_PORT) {
            postgres.port = port
                .trim()
                .parse()
                .map_err(|_| ConfigError::Invalid(format!("{ENV_DB_PORT} must be a port number")))?;
        }
        if let Some(database) = lookup(ENV_DB_NAME) {
            postgres.database = database;
        }
        if let Some(user) = lookup(ENV_DB_USER) {
            postgres.user = user;
        }
        if let Some(password) = lookup(ENV_DB_PASSWORD) {
            postgres.password = Some(password);
        }
        Ok(())
    }

    /// Validates the configuration for internal consistency.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when configuration is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.server.validate()?;
        self.storage.validate()?;
        self.audit.validate()?;
        Ok(())
    }

    /// Returns a summary safe to print or log; secrets are reduced to flags.
    #[must_use]
    pub fn summary(&self) -> ConfigSummary {
        let postgres = &self.storage.postgres;
        ConfigSummary {
            bind: self.server.bind.clone(),
            max_body_bytes: self.server.max_body_bytes,
            backend: self.storage.backend.as_str(),
            commit_policy: self.storage.commit_policy.as_str(),
            postgres: (self.storage.backend == StorageBackend::Postgres).then(|| {
                PostgresSummary {
                    host: postgres.host.clone(),
                    port: postgres.port,
                    database: postgres.database.clone(),
                    user: postgres.user.clone(),
                    password_set: postgres.password.is_some(),
                    max_connections: postgres.max_connections,
                    connect_timeout_ms: postgres.connect_timeout_ms,
                }
            }),
            sqlite_path: self
                .storage
                .sqlite
                .as_ref()
                .filter(|_| self.storage.backend == StorageBackend::Sqlite)
                .map(|sqlite| sqlite.path.display().to_string()),
            audit_sink: self.audit.sink,
        }
    }
}

/// Printable configuration summary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConfigSummary {
    /// Listener address.
    pub bind: String,
    /// Request body limit.
    pub max_body_bytes: usize,
    /// Storage backend label.
    pub backend: &'static str,
    /// Commit policy label.
    pub commit_policy: &'static str,
    /// PostgreSQL settings when that backend is selected.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub postgres: Option<PostgresSummary>,
    /// `SQLite` path when that backend is selected.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sqlite_path: Option<String>,
    /// Audit sink selector.
    pub audit_sink: AuditSinkKind,
}

/// PostgreSQL settings with the password reduced to a flag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PostgresSummary {
    /// Server host.
    pub host: String,
    /// Server port.
    pub port: u16,
    /// Database name.
    pub database: String,
    /// Role name.
    pub user: String,
    /// Whether a password is configured.
    pub password_set: bool,
    /// Pool size.
    pub max_connections: u32,
    /// Connect timeout in milliseconds.
    pub connect_timeout_ms: u64,
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Configuration loading or validation errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// I/O failure while reading configuration.
    #[error("config io error: {0}")]
    Io(String),
    /// TOML parsing error.
    #[error("config parse error: {0}")]
    Parse(String),
    /// Invalid configuration data.
    #[error("invalid config: {0}")]
    Invalid(String),
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Where the config path came from.
enum ConfigSource {
    /// Named by the caller or the environment; must exist.
    Explicit(PathBuf),
    /// Default filename; may be absent.
    Default(PathBuf),
}

/// Resolves the config path from CLI or environment defaults.
fn resolve_path(path: Option<&Path>) -> Result<ConfigSource, ConfigError> {
    if let Some(path) = path {
        return Ok(ConfigSource::Explicit(path.to_path_buf()));
    }
    if let Ok(env_path) = env::var(CONFIG_ENV_VAR) {
        if env_path.len() > MAX_TOTAL_PATH_LENGTH {
            return Err(ConfigError::Invalid("config path exceeds max length".to_string()));
        }
        return Ok(ConfigSource::Explicit(PathBuf::from(env_path)));
    }
    Ok(ConfigSource::Default(PathBuf::from(DEFAULT_CONFIG_NAME)))
}

/// Validates a path against security limits.
fn validate_path(path: &Path) -> Result<(), ConfigError> {
    let text = path.to_string_lossy();
    if text.len() > MAX_TOTAL_PATH_LENGTH {
        return Err(ConfigError::Invalid("config path exceeds max length".to_string()));
    }
    for component in path.components() {
        let value = component.as_os_str().to_string_lossy();
        if value.len() > MAX_PATH_COMPONENT_LENGTH {
            return Err(ConfigError::Invalid("config path component too long".to_string()));
        }
    }
    Ok(())
}

/// Validates a path string against length constraints.
fn validate_path_string(field: &str, value: &str) -> Result<(), ConfigError> {
    if value.trim().is_empty() {
        return Err(ConfigError::Invalid(format!("{field} must be non-empty")));
    }
    validate_path(Path::new(value)).map_err(|err| ConfigError::Invalid(format!("{field}: {err}")))
}

/// Default bind address for serde.
fn default_bind() -> String {
    DEFAULT_BIND.to_string()
}

/// Default body limit for serde.
const fn default_max_body_bytes() -> usize {
    DEFAULT_MAX_BODY_BYTES
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    #![allow(
        clippy::panic,
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::use_debug,
        reason = "Test-only assertions."
    )]

    use super::MAX_PATH_COMPONENT_LENGTH;
    use super::MAX_TOTAL_PATH_LENGTH;
    use super::validate_path_string;

    #[test]
    fn validate_path_string_rejects_whitespace_only() {
        assert!(validate_path_string("audit.path", "   ").is_err());
    }

    #[test]
    fn validate_path_string_rejects_component_too_long() {
        let path = format!("./{}", "a".repeat(MAX_PATH_COMPONENT_LENGTH + 1));
        assert!(validate_path_string("audit.path", &path).is_err());
    }

    #[test]
    fn validate_path_string_rejects_exceeds_max_length() {
        let path = "a/".repeat(MAX_TOTAL_PATH_LENGTH);
        assert!(validate_path_string("audit.path", &path).is_err());
    }

    #[test]
    fn validate_path_string_accepts_nested_path() {
        assert!(validate_path_string("audit.path", "./logs/freefall/audit.jsonl").is_ok());
    }
}
