// crates/freefall-store-postgres/tests/postgres_live.rs
// ============================================================================
// Module: Postgres Live Store Tests
// Description: Runs the ingestion pipeline against a disposable PostgreSQL.
// Purpose: Validate server-side narrowing, row isolation, and batch rollback.
// Dependencies: testcontainers, tokio
// ============================================================================

//! ## Overview
//! Requires Docker. Enabled with `--features postgres-tests`. A container is
//! started per test; store calls run on the blocking pool because the
//! synchronous client drives its own runtime.

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

use std::time::Duration;

use freefall_core::BatchOutcome;
use freefall_core::CancellationFlag;
use freefall_core::CommitPolicy;
use freefall_core::IngestError;
use freefall_core::IngestPipeline;
use freefall_core::ReadingStore;
use freefall_core::SharedReadingStore;
use freefall_store_postgres::PostgresReadingStore;
use freefall_store_postgres::PostgresStoreConfig;
use testcontainers::ContainerAsync;
use testcontainers::GenericImage;
use testcontainers::ImageExt;
use testcontainers::core::IntoContainerPort;
use testcontainers::core::WaitFor;
use testcontainers::runners::AsyncRunner;

const PASSWORD: &str = "freefall-test";

const BODY: &[u8] = b"session_id,timestamp,accelX,accelY,accelZ,gyroX,gyroY,gyroZ,posX,posY,posZ
1,1,0.1,0.2,9.8,0.01,0.02,0.03,0.0,0.0,1.5
4294967296,2,0.1,0.2,9.8,0.01,0.02,0.03,0.0,0.0,1.5
1,3,0.1,0.2,9.8,0.01,0.02,0.03,0.0,0.0,1.5
";

async fn start_postgres() -> Result<(ContainerAsync<GenericImage>, PostgresStoreConfig), String> {
    let container = GenericImage::new("postgres", "16-alpine")
        .with_exposed_port(5432.tcp())
        .with_wait_for(WaitFor::message_on_stderr("database system is ready to accept connections"))
        .with_env_var("POSTGRES_PASSWORD", PASSWORD)
        .with_env_var("POSTGRES_DB", "freefall")
        .start()
        .await
        .map_err(|err| format!("failed to start postgres container: {err}"))?;
    let port = container
        .get_host_port_ipv4(5432.tcp())
        .await
        .map_err(|err| format!("failed to resolve postgres port: {err}"))?;
    let config = PostgresStoreConfig {
        host: "127.0.0.1".to_string(),
        port,
        password: Some(PASSWORD.to_string()),
        ..PostgresStoreConfig::default()
    };
    Ok((container, config))
}

/// Connects with retries; the image restarts once after initialization.
fn connect(config: &PostgresStoreConfig) -> Result<PostgresReadingStore, String> {
    let mut last_error = String::new();
    for _ in 0 .. 30 {
        match PostgresReadingStore::new(config) {
            Ok(store) => return Ok(store),
            Err(err) => last_error = err.to_string(),
        }
        std::thread::sleep(Duration::from_millis(500));
    }
    Err(last_error)
}

fn count_rows(config: &PostgresStoreConfig) -> i64 {
    let mut client = postgres::Config::new()
        .host(&config.host)
        .port(config.port)
        .dbname(&config.database)
        .user(&config.user)
        .password(PASSWORD)
        .connect(postgres::NoTls)
        .unwrap();
    client.query_one("SELECT count(*) FROM freefall_data", &[]).unwrap().get(0)
}

fn run(config: PostgresStoreConfig, policy: CommitPolicy) -> (Result<BatchOutcome, IngestError>, i64) {
    let store = connect(&config).unwrap();
    store.ensure_schema().unwrap();
    store.ensure_schema().unwrap();
    store.reachable().unwrap();
    let pipeline = IngestPipeline::new(SharedReadingStore::from_store(store), policy);
    let result = pipeline.ingest(BODY, &CancellationFlag::new());
    (result, count_rows(&config))
}

#[tokio::test(flavor = "multi_thread")]
async fn per_row_narrowing_failure_is_isolated() {
    let (_container, config) = start_postgres().await.unwrap();
    let (result, rows) =
        tokio::task::spawn_blocking(move || run(config, CommitPolicy::PerRow)).await.unwrap();
    let outcome = result.unwrap();
    assert_eq!(outcome.rows_inserted, 2);
    assert_eq!(outcome.rows_with_errors, 1);
    assert_eq!(outcome.failed_lines, vec![2]);
    assert_eq!(rows, 2);
}

#[tokio::test(flavor = "multi_thread")]
async fn batch_narrowing_failure_rolls_back() {
    let (_container, config) = start_postgres().await.unwrap();
    let (result, rows) =
        tokio::task::spawn_blocking(move || run(config, CommitPolicy::Batch)).await.unwrap();
    assert!(matches!(result, Err(IngestError::BatchAborted { line: 2, .. })));
    assert_eq!(rows, 0);
}
