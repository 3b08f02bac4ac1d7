// crates/freefall-store-postgres/tests/postgres_config.rs
// ============================================================================
// Module: Postgres Store Config Tests
// Description: Tests for config defaults, validation, and failed connects.
// ============================================================================
//! ## Overview
//! Exercises the Postgres store without a running server.

#![allow(
    clippy::panic,
    clippy::print_stdout,
    clippy::print_stderr,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    clippy::dbg_macro,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    reason = "Test-only assertions and helpers are permitted."
)]

use freefall_store_postgres::PostgresReadingStore;
use freefall_store_postgres::PostgresStoreConfig;
use freefall_store_postgres::PostgresStoreError;

#[test]
fn defaults_carry_no_password() {
    let config = PostgresStoreConfig::default();
    assert_eq!(config.host, "localhost");
    assert_eq!(config.port, 5432);
    assert!(config.password.is_none());
    config.validate().unwrap();
}

#[test]
fn debug_output_redacts_password() {
    let config = PostgresStoreConfig {
        password: Some("hunter2".to_string()),
        ..PostgresStoreConfig::default()
    };
    let rendered = format!("{config:?}");
    assert!(!rendered.contains("hunter2"));
    assert!(rendered.contains("<redacted>"));
}

#[test]
fn zero_pool_size_is_rejected() {
    let config = PostgresStoreConfig {
        max_connections: 0,
        ..PostgresStoreConfig::default()
    };
    assert!(matches!(config.validate(), Err(PostgresStoreError::Invalid(_))));
}

#[test]
fn empty_host_is_rejected() {
    let config = PostgresStoreConfig {
        host: " ".to_string(),
        ..PostgresStoreConfig::default()
    };
    assert!(matches!(PostgresReadingStore::new(&config).err(), Some(PostgresStoreError::Invalid(_))));
}

#[test]
fn unreachable_server_fails_within_timeout() {
    let config = PostgresStoreConfig {
        host: "127.0.0.1".to_string(),
        port: 1,
        connect_timeout_ms: 300,
        ..PostgresStoreConfig::default()
    };
    let started = std::time::Instant::now();
    let err = PostgresReadingStore::new(&config).err();
    assert!(matches!(err, Some(PostgresStoreError::Postgres(_))));
    assert!(started.elapsed() < std::time::Duration::from_secs(10));
}

#[test]
fn config_parses_with_defaults() {
    let config: PostgresStoreConfig = toml::from_str("host = \"db\"\nport = 6543\n").unwrap();
    assert_eq!(config.host, "db");
    assert_eq!(config.port, 6543);
    assert_eq!(config.database, "freefall");
    assert!(config.password.is_none());
}

#[test]
fn unknown_keys_are_rejected() {
    let parsed: Result<PostgresStoreConfig, _> = toml::from_str("hostname = \"db\"\n");
    assert!(parsed.is_err());
}
