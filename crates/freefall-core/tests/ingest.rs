// crates/freefall-core/tests/ingest.rs
// ============================================================================
// Module: Ingestion Orchestrator Tests
// Description: Tests for batch accounting, isolation, and abort paths.
// ============================================================================
//! ## Overview
//! Drives full payloads through the pipeline against the in-memory store.

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
    reason = "Test-only output and panic-based assertions are permitted."
)]

use freefall_core::CancellationFlag;
use freefall_core::CommitPolicy;
use freefall_core::DecodeError;
use freefall_core::InMemoryReadingStore;
use freefall_core::IngestError;
use freefall_core::IngestErrorClass;
use freefall_core::IngestPipeline;
use freefall_core::ReadingStore;
use freefall_core::SharedReadingStore;

const HEADER: &str =
    "session_id,timestamp,accelX,accelY,accelZ,gyroX,gyroY,gyroZ,posX,posY,posZ\n";

fn pipeline(store: &InMemoryReadingStore, policy: CommitPolicy) -> IngestPipeline {
    IngestPipeline::new(SharedReadingStore::from_store(store.clone()), policy)
}

fn payload(lines: &[&str]) -> Vec<u8> {
    let mut text = HEADER.to_string();
    for line in lines {
        text.push_str(line);
        text.push('\n');
    }
    text.into_bytes()
}

fn valid_line(session: i64, timestamp: i64) -> String {
    format!("{session},{timestamp},0.1,0.2,9.8,0.01,0.02,0.03,0.0,0.0,1.5")
}

#[test]
fn header_only_completes_with_zero_counts() {
    let store = InMemoryReadingStore::new();
    let outcome =
        pipeline(&store, CommitPolicy::PerRow).ingest(HEADER.as_bytes(), &CancellationFlag::new()).unwrap();
    assert_eq!(outcome.rows_inserted, 0);
    assert_eq!(outcome.rows_skipped(), 0);
    assert_eq!(outcome.rows_with_errors, 0);
    assert!(store.rows().unwrap().is_empty());
}

#[test]
fn single_valid_line_is_persisted() {
    let store = InMemoryReadingStore::new();
    let body = b"header\n1,1000,0.1,0.2,9.8,0.01,0.02,0.03,0.0,0.0,1.5\n";
    let outcome = pipeline(&store, CommitPolicy::PerRow).ingest(body, &CancellationFlag::new()).unwrap();
    assert_eq!(outcome.rows_inserted, 1);
    assert_eq!(outcome.rows_skipped(), 0);
    assert_eq!(outcome.rows_with_errors, 0);
    let rows = store.rows().unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].timestamp, 1000);
}

#[test]
fn short_line_is_skipped_and_never_stored() {
    let store = InMemoryReadingStore::new();
    let body = payload(&["1,1000,0.1,0.2,9.8,0.01,0.02,0.03,0.0,0.0", &valid_line(1, 1001)]);
    let outcome = pipeline(&store, CommitPolicy::PerRow).ingest(&body, &CancellationFlag::new()).unwrap();
    assert_eq!(outcome.rows_inserted, 1);
    assert_eq!(outcome.rows_skipped(), 1);
    assert_eq!(outcome.rows_skipped_arity, 1);
    assert_eq!(outcome.rows_with_errors, 0);
    assert_eq!(outcome.rejections[0].line, 1);
    assert_eq!(store.rows().unwrap().len(), 1);
}

#[test]
fn unconvertible_line_is_skipped() {
    let store = InMemoryReadingStore::new();
    let body = payload(&["1,1000,abc,0.2,9.8,0.01,0.02,0.03,0.0,0.0,1.5", &valid_line(1, 2)]);
    let outcome = pipeline(&store, CommitPolicy::PerRow).ingest(&body, &CancellationFlag::new()).unwrap();
    assert_eq!(outcome.rows_skipped_invalid, 1);
    assert_eq!(outcome.rows_inserted, 1);
    assert_eq!(store.rows().unwrap().len(), 1);
}

#[test]
fn resubmission_stores_duplicate_rows() {
    let store = InMemoryReadingStore::new();
    let pipeline = pipeline(&store, CommitPolicy::PerRow);
    let body = payload(&[&valid_line(9, 1), &valid_line(9, 2)]);
    let first = pipeline.ingest(&body, &CancellationFlag::new()).unwrap();
    let second = pipeline.ingest(&body, &CancellationFlag::new()).unwrap();
    assert_eq!(first, second);
    assert_eq!(store.rows().unwrap().len(), 4);
}

#[test]
fn per_row_insert_failure_is_isolated() {
    let store = InMemoryReadingStore::new();
    store.reject_rows_where(|reading| reading.timestamp == 2).unwrap();
    let body = payload(&[&valid_line(1, 1), &valid_line(1, 2), &valid_line(1, 3)]);
    let outcome = pipeline(&store, CommitPolicy::PerRow).ingest(&body, &CancellationFlag::new()).unwrap();
    assert_eq!(outcome.rows_inserted, 2);
    assert_eq!(outcome.rows_with_errors, 1);
    assert_eq!(outcome.failed_lines, vec![2]);
    let stamps: Vec<i64> = store.rows().unwrap().iter().map(|row| row.timestamp).collect();
    assert_eq!(stamps, vec![1, 3]);
}

#[test]
fn batch_insert_failure_rolls_back_everything() {
    let store = InMemoryReadingStore::new();
    store.reject_rows_where(|reading| reading.timestamp == 2).unwrap();
    let body = payload(&[&valid_line(1, 1), &valid_line(1, 2), &valid_line(1, 3)]);
    let err = pipeline(&store, CommitPolicy::Batch).ingest(&body, &CancellationFlag::new()).unwrap_err();
    assert!(matches!(err, IngestError::BatchAborted { line: 2, .. }));
    assert_eq!(err.class(), IngestErrorClass::Server);
    assert!(store.rows().unwrap().is_empty());
}

#[test]
fn batch_policy_commits_at_end() {
    let store = InMemoryReadingStore::new();
    let body = payload(&[&valid_line(1, 1), "bad", &valid_line(1, 3)]);
    let outcome = pipeline(&store, CommitPolicy::Batch).ingest(&body, &CancellationFlag::new()).unwrap();
    assert_eq!(outcome.rows_inserted, 2);
    assert_eq!(outcome.rows_skipped(), 1);
    assert_eq!(store.rows().unwrap().len(), 2);
}

#[test]
fn decode_failure_does_not_contact_storage() {
    let store = InMemoryReadingStore::new();
    store.set_unavailable(true).unwrap();
    let err = pipeline(&store, CommitPolicy::PerRow).ingest(b"", &CancellationFlag::new()).unwrap_err();
    assert_eq!(err, IngestError::Decode(DecodeError::EmptyPayload));
    assert_eq!(err.class(), IngestErrorClass::Client);
}

#[test]
fn unavailable_store_aborts_with_server_class() {
    let store = InMemoryReadingStore::new();
    store.set_unavailable(true).unwrap();
    let body = payload(&[&valid_line(1, 1)]);
    let err = pipeline(&store, CommitPolicy::PerRow).ingest(&body, &CancellationFlag::new()).unwrap_err();
    assert!(matches!(err, IngestError::Unavailable(_)));
    assert_eq!(err.class(), IngestErrorClass::Server);
    assert!(store.reachable().is_err());
}

#[test]
fn lost_connection_aborts_mid_batch_and_keeps_committed_rows() {
    let store = InMemoryReadingStore::new();
    store.disconnect_after(1).unwrap();
    let body = payload(&[&valid_line(1, 1), &valid_line(1, 2), &valid_line(1, 3)]);
    let err = pipeline(&store, CommitPolicy::PerRow).ingest(&body, &CancellationFlag::new()).unwrap_err();
    assert!(matches!(err, IngestError::Unavailable(_)));
    assert_eq!(store.rows().unwrap().len(), 1);
}

#[test]
fn raised_cancellation_stops_before_the_first_record() {
    let store = InMemoryReadingStore::new();
    let cancel = CancellationFlag::new();
    cancel.cancel();
    let body = payload(&[&valid_line(1, 1)]);
    let err = pipeline(&store, CommitPolicy::Batch).ingest(&body, &cancel).unwrap_err();
    assert_eq!(
        err,
        IngestError::Cancelled {
            processed: 0,
        }
    );
    assert_eq!(err.class(), IngestErrorClass::Cancelled);
    assert!(store.rows().unwrap().is_empty());
}

#[test]
fn ensure_schema_is_idempotent() {
    let store = InMemoryReadingStore::new();
    store.ensure_schema().unwrap();
    store.ensure_schema().unwrap();
    assert!(store.schema_ready().unwrap());
}

fn cancel_on_first_persist(store: &InMemoryReadingStore) -> CancellationFlag {
    let cancel = CancellationFlag::new();
    let trigger = cancel.clone();
    store
        .reject_rows_where(move |_| {
            trigger.cancel();
            false
        })
        .unwrap();
    cancel
}

#[test]
fn per_row_cancellation_keeps_committed_rows() {
    let store = InMemoryReadingStore::new();
    let cancel = cancel_on_first_persist(&store);
    let body = payload(&[&valid_line(1, 1), &valid_line(1, 2), &valid_line(1, 3)]);
    let err = pipeline(&store, CommitPolicy::PerRow).ingest(&body, &cancel).unwrap_err();
    assert_eq!(
        err,
        IngestError::Cancelled {
            processed: 1,
        }
    );
    let stamps: Vec<i64> = store.rows().unwrap().iter().map(|row| row.timestamp).collect();
    assert_eq!(stamps, vec![1]);
}

#[test]
fn batch_cancellation_rolls_back_open_batch() {
    let store = InMemoryReadingStore::new();
    let cancel = cancel_on_first_persist(&store);
    let body = payload(&[&valid_line(1, 1), &valid_line(1, 2), &valid_line(1, 3)]);
    let err = pipeline(&store, CommitPolicy::Batch).ingest(&body, &cancel).unwrap_err();
    assert_eq!(
        err,
        IngestError::Cancelled {
            processed: 1,
        }
    );
    assert!(store.rows().unwrap().is_empty());
}

#[test]
fn failed_rollback_is_reported_with_batch_abort() {
    let store = InMemoryReadingStore::new();
    store.reject_rows_where(|reading| reading.timestamp == 2).unwrap();
    store.fail_rollbacks().unwrap();
    let body = payload(&[&valid_line(1, 1), &valid_line(1, 2)]);
    let err = pipeline(&store, CommitPolicy::Batch).ingest(&body, &CancellationFlag::new()).unwrap_err();
    let IngestError::BatchAborted {
        line,
        message,
    } = err
    else {
        panic!("expected batch abort, got {err:?}");
    };
    assert_eq!(line, 2);
    assert!(message.contains("row refused"));
    assert!(message.contains("rollback failed"));
    assert!(store.rows().unwrap().is_empty());
}

#[test]
fn failed_rollback_is_reported_with_lost_connection() {
    let store = InMemoryReadingStore::new();
    store.disconnect_after(1).unwrap();
    store.fail_rollbacks().unwrap();
    let body = payload(&[&valid_line(1, 1), &valid_line(1, 2)]);
    let err = pipeline(&store, CommitPolicy::Batch).ingest(&body, &CancellationFlag::new()).unwrap_err();
    let IngestError::Unavailable(message) = err else {
        panic!("expected unavailable, got {err:?}");
    };
    assert!(message.contains("connection lost"));
    assert!(message.contains("rollback failed"));
}
