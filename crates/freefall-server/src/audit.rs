// crates/freefall-server/src/audit.rs
// ============================================================================
// Module: Freefall Audit Logging
// Description: Structured audit events for upload and health requests.
// Purpose: Emit one JSON-line event per request without hard dependencies.
// Dependencies: freefall-core, serde, serde_json
// ============================================================================

//! ## Overview
//! Audit events are serialized as single JSON lines. Sinks route them to
//! stderr, an append-only file, or nowhere. Upload events carry the batch
//! counters and a capped sample of rejection detail so a hostile payload
//! cannot inflate the log.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fs::OpenOptions;
use std::io;
use std::io::Write;
use std::path::Path;
use std::sync::Mutex;
use std::time::SystemTime;
use std::time::UNIX_EPOCH;

use freefall_core::BatchOutcome;
use freefall_core::Rejection;
use serde::Serialize;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Maximum rejection details carried by one upload event.
pub const MAX_AUDIT_REJECTIONS: usize = 32;
/// Maximum failed line numbers carried by one upload event.
pub const MAX_AUDIT_FAILED_LINES: usize = 256;

// ============================================================================
// SECTION: Types
// ============================================================================

/// Upload audit event payload.
#[derive(Debug, Clone, Serialize)]
pub struct IngestAuditEvent {
    /// Event identifier.
    pub event: &'static str,
    /// Event timestamp (milliseconds since epoch).
    pub timestamp_ms: u128,
    /// Peer IP address when available.
    pub peer_ip: Option<String>,
    /// Response status code.
    pub status: u16,
    /// Outcome label.
    pub outcome: &'static str,
    /// Error message for request-fatal failures.
    pub error: Option<String>,
    /// Request body size in bytes.
    pub request_bytes: usize,
    /// Handling time in milliseconds.
    pub duration_ms: u128,
    /// Rows persisted.
    pub rows_inserted: usize,
    /// Lines skipped for field count.
    pub rows_skipped_arity: usize,
    /// Lines skipped for conversion failures.
    pub rows_skipped_invalid: usize,
    /// Rows that failed at insert time.
    pub rows_with_errors: usize,
    /// Failed line numbers, capped.
    pub failed_lines: Vec<usize>,
    /// Rejection sample, capped.
    pub rejections: Vec<Rejection>,
    /// True when any detail list was cut short.
    pub detail_truncated: bool,
}

/// Health probe audit event payload.
#[derive(Debug, Clone, Serialize)]
pub struct HealthAuditEvent {
    /// Event identifier.
    pub event: &'static str,
    /// Event timestamp (milliseconds since epoch).
    pub timestamp_ms: u128,
    /// Peer IP address when available.
    pub peer_ip: Option<String>,
    /// Whether storage answered.
    pub reachable: bool,
    /// Storage error message when unreachable.
    pub error: Option<String>,
}

/// Startup audit event payload.
#[derive(Debug, Clone, Serialize)]
pub struct StartupAuditEvent {
    /// Event identifier.
    pub event: &'static str,
    /// Event timestamp (milliseconds since epoch).
    pub timestamp_ms: u128,
    /// Bound listener address.
    pub bind: String,
    /// Storage backend label.
    pub backend: &'static str,
    /// Commit policy label.
    pub commit_policy: &'static str,
    /// Request body limit.
    pub max_body_bytes: usize,
}

/// Inputs required to construct an upload audit event.
pub struct IngestAuditEventParams<'a> {
    /// Peer IP address if known.
    pub peer_ip: Option<String>,
    /// Response status code.
    pub status: u16,
    /// Outcome label.
    pub outcome: &'static str,
    /// Error message for request-fatal failures.
    pub error: Option<String>,
    /// Request body size in bytes.
    pub request_bytes: usize,
    /// Handling time in milliseconds.
    pub duration_ms: u128,
    /// Batch outcome when the batch completed.
    pub batch: Option<&'a BatchOutcome>,
}

impl IngestAuditEvent {
    /// Creates an upload event, capping detail lists.
    #[must_use]
    pub fn new(params: IngestAuditEventParams<'_>) -> Self {
        let empty = BatchOutcome::new();
        let batch = params.batch.unwrap_or(&empty);
        let failed_lines: Vec<usize> =
            batch.failed_lines.iter().copied().take(MAX_AUDIT_FAILED_LINES).collect();
        let rejections: Vec<Rejection> =
            batch.rejections.iter().take(MAX_AUDIT_REJECTIONS).cloned().collect();
        let detail_truncated = batch.rejections_truncated
            || failed_lines.len() < batch.failed_lines.len()
            || rejections.len() < batch.rejections.len();
        Self {
            event: "freefall_ingest",
            timestamp_ms: now_ms(),
            peer_ip: params.peer_ip,
            status: params.status,
            outcome: params.outcome,
            error: params.error,
            request_bytes: params.request_bytes,
            duration_ms: params.duration_ms,
            rows_inserted: batch.rows_inserted,
            rows_skipped_arity: batch.rows_skipped_arity,
            rows_skipped_invalid: batch.rows_skipped_invalid,
            rows_with_errors: batch.rows_with_errors,
            failed_lines,
            rejections,
            detail_truncated,
        }
    }
}

impl HealthAuditEvent {
    /// Creates a health event.
    #[must_use]
    pub fn new(peer_ip: Option<String>, error: Option<String>) -> Self {
        Self {
            event: "freefall_health",
            timestamp_ms: now_ms(),
            peer_ip,
            reachable: error.is_none(),
            error,
        }
    }
}

impl StartupAuditEvent {
    /// Creates a startup event.
    #[must_use]
    pub fn new(
        bind: String,
        backend: &'static str,
        commit_policy: &'static str,
        max_body_bytes: usize,
    ) -> Self {
        Self {
            event: "freefall_startup",
            timestamp_ms: now_ms(),
            bind,
            backend,
            commit_policy,
            max_body_bytes,
        }
    }
}

/// Returns the current time in milliseconds since epoch.
fn now_ms() -> u128 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_millis()
}

// ============================================================================
// SECTION: Trait
// ============================================================================

/// Audit sink for request events.
pub trait AuditSink: Send + Sync {
    /// Records an upload event.
    fn record_ingest(&self, event: &IngestAuditEvent);

    /// Records a health probe event.
    fn record_health(&self, _event: &HealthAuditEvent) {}

    /// Records a startup event.
    fn record_startup(&self, _event: &StartupAuditEvent) {}
}

/// Audit sink that logs JSON lines to stderr.
pub struct StderrAuditSink;

impl AuditSink for StderrAuditSink {
    fn record_ingest(&self, event: &IngestAuditEvent) {
        write_line(&mut io::stderr(), event);
    }

    fn record_health(&self, event: &HealthAuditEvent) {
        write_line(&mut io::stderr(), event);
    }

    fn record_startup(&self, event: &StartupAuditEvent) {
        write_line(&mut io::stderr(), event);
    }
}

/// Audit sink that appends JSON lines to a file.
pub struct FileAuditSink {
    /// File handle guarded for concurrent writes.
    file: Mutex<std::fs::File>,
}

impl FileAuditSink {
    /// Opens an audit sink that appends to the provided path.
    ///
    /// # Errors
    ///
    /// Returns an error when the file cannot be opened.
    pub fn new(path: &Path) -> io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            file: Mutex::new(file),
        })
    }

    /// Writes one event under the file lock.
    fn append(&self, event: &impl Serialize) {
        if let Ok(mut file) = self.file.lock() {
            write_line(&mut *file, event);
            let _ = file.flush();
        }
    }
}

impl AuditSink for FileAuditSink {
    fn record_ingest(&self, event: &IngestAuditEvent) {
        self.append(event);
    }

    fn record_health(&self, event: &HealthAuditEvent) {
        self.append(event);
    }

    fn record_startup(&self, event: &StartupAuditEvent) {
        self.append(event);
    }
}

/// No-op audit sink.
pub struct NoopAuditSink;

impl AuditSink for NoopAuditSink {
    fn record_ingest(&self, _event: &IngestAuditEvent) {}
}

/// Serializes an event as one line; serialization failures drop the event.
fn write_line(writer: &mut impl Write, event: &impl Serialize) {
    if let Ok(payload) = serde_json::to_string(event) {
        let _ = writeln!(writer, "{payload}");
    }
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

    use freefall_core::BatchOutcome;
    use freefall_core::Rejection;
    use freefall_core::RejectionReason;

    use super::IngestAuditEvent;
    use super::IngestAuditEventParams;
    use super::MAX_AUDIT_REJECTIONS;

    #[test]
    fn ingest_event_caps_rejection_sample() {
        let mut batch = BatchOutcome::new();
        for line in 1 ..= MAX_AUDIT_REJECTIONS + 3 {
            batch.record_rejection(Rejection {
                line,
                reason: RejectionReason::WrongFieldCount {
                    actual: 3,
                },
            });
        }
        let event = IngestAuditEvent::new(IngestAuditEventParams {
            peer_ip: None,
            status: 200,
            outcome: "success",
            error: None,
            request_bytes: 10,
            duration_ms: 1,
            batch: Some(&batch),
        });
        assert_eq!(event.rejections.len(), MAX_AUDIT_REJECTIONS);
        assert_eq!(event.rows_skipped_arity, MAX_AUDIT_REJECTIONS + 3);
        assert!(event.detail_truncated);
    }

    #[test]
    fn ingest_event_without_batch_has_zero_counts() {
        let event = IngestAuditEvent::new(IngestAuditEventParams {
            peer_ip: Some("127.0.0.1".to_string()),
            status: 400,
            outcome: "client_error",
            error: Some("payload is empty".to_string()),
            request_bytes: 0,
            duration_ms: 0,
            batch: None,
        });
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["event"], "freefall_ingest");
        assert_eq!(value["rows_inserted"], 0);
        assert!(!event.detail_truncated);
    }
}
