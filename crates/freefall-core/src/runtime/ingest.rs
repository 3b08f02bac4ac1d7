// crates/freefall-core/src/runtime/ingest.rs
// ============================================================================
// Module: Ingestion Orchestrator
// Description: Drives one payload through decode, validate, and persist.
// Purpose: Produce a batch outcome while isolating per-record failures.
// Dependencies: crate::{core, interfaces, runtime}, thiserror
// ============================================================================

//! ## Overview
//! [`IngestPipeline::ingest`] walks a payload in strict order. Decode
//! failures abort before storage is contacted. Validation failures are
//! counted and never reach the store. Insert failures are record-local under
//! [`CommitPolicy::PerRow`] and abort the request under
//! [`CommitPolicy::Batch`]. A lost connection always aborts.
//!
//! The pipeline is synchronous; async callers run it on a blocking worker
//! and signal disconnects through a [`CancellationFlag`].

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;

use thiserror::Error;

use crate::core::BatchOutcome;
use crate::interfaces::CommitPolicy;
use crate::interfaces::ReadingSession;
use crate::interfaces::ReadingStore;
use crate::interfaces::SinkError;
use crate::runtime::decoder::DecodeError;
use crate::runtime::decoder::decode_payload;
use crate::runtime::store::SharedReadingStore;
use crate::runtime::validator::validate_record;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Broad class of a request-fatal ingestion failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestErrorClass {
    /// The caller sent an unusable payload.
    Client,
    /// Storage failed or the batch was aborted.
    Server,
    /// The caller went away before the batch finished.
    Cancelled,
}

/// Request-fatal ingestion failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IngestError {
    /// The payload could not be decoded.
    #[error(transparent)]
    Decode(#[from] DecodeError),
    /// Storage could not be reached or the connection was lost.
    #[error("{0}")]
    Unavailable(String),
    /// A batch-policy insert failed and the batch was rolled back.
    #[error("batch aborted at line {line}: {message}")]
    BatchAborted {
        /// Line whose insert failed.
        line: usize,
        /// Storage failure message.
        message: String,
    },
    /// Cancellation was observed between records.
    #[error("ingestion cancelled after {processed} records")]
    Cancelled {
        /// Records fully handled before cancellation.
        processed: usize,
    },
}

impl IngestError {
    /// Returns the failure class used to pick a response status.
    #[must_use]
    pub const fn class(&self) -> IngestErrorClass {
        match self {
            Self::Decode(_) => IngestErrorClass::Client,
            Self::Unavailable(_) | Self::BatchAborted { .. } => IngestErrorClass::Server,
            Self::Cancelled { .. } => IngestErrorClass::Cancelled,
        }
    }
}

// ============================================================================
// SECTION: Cancellation
// ============================================================================

/// Cooperative cancellation signal shared between a request and its worker.
#[derive(Debug, Clone, Default)]
pub struct CancellationFlag(Arc<AtomicBool>);

impl CancellationFlag {
    /// Creates a flag that is not raised.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Raises the flag.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    /// Returns true once the flag has been raised.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

// ============================================================================
// SECTION: Pipeline
// ============================================================================

/// Ingestion pipeline bound to one store and commit policy.
#[derive(Clone)]
pub struct IngestPipeline {
    /// Destination store.
    store: SharedReadingStore,
    /// Commit policy applied to every request.
    policy: CommitPolicy,
}

impl IngestPipeline {
    /// Creates a pipeline.
    #[must_use]
    pub const fn new(store: SharedReadingStore, policy: CommitPolicy) -> Self {
        Self {
            store,
            policy,
        }
    }

    /// Returns the destination store.
    #[must_use]
    pub const fn store(&self) -> &SharedReadingStore {
        &self.store
    }

    /// Ingests one payload and returns its batch outcome.
    ///
    /// # Errors
    ///
    /// Returns [`IngestError`] when the payload cannot be decoded, storage is
    /// unavailable, a batch-policy insert fails, or `cancel` is raised.
    pub fn ingest(
        &self,
        payload: &[u8],
        cancel: &CancellationFlag,
    ) -> Result<BatchOutcome, IngestError> {
        let records = decode_payload(payload)?;
        let mut session = self.store.open_session().map_err(unavailable)?;
        if self.policy == CommitPolicy::Batch {
            session.begin_batch().map_err(unavailable)?;
        }

        let mut outcome = BatchOutcome::new();
        for record in records {
            if cancel.is_cancelled() {
                if self.policy == CommitPolicy::Batch {
                    // Dropping the session discards the transaction if this fails.
                    let _ = session.rollback_batch();
                }
                return Err(IngestError::Cancelled {
                    processed: outcome.records_seen(),
                });
            }
            let reading = match validate_record(&record) {
                Ok(reading) => reading,
                Err(rejection) => {
                    outcome.record_rejection(rejection);
                    continue;
                }
            };
            match session.persist(&reading) {
                Ok(()) => outcome.record_inserted(),
                Err(err) if err.is_row_local() && self.policy == CommitPolicy::PerRow => {
                    outcome.record_insert_failure(record.line);
                }
                Err(err) if err.is_row_local() => {
                    return Err(IngestError::BatchAborted {
                        line: record.line,
                        message: self.abort_batch(session.as_mut(), err.to_string()),
                    });
                }
                Err(err) => {
                    return Err(IngestError::Unavailable(
                        self.abort_batch(session.as_mut(), err.to_string()),
                    ));
                }
            }
        }

        if self.policy == CommitPolicy::Batch {
            session.commit_batch().map_err(unavailable)?;
        }
        Ok(outcome)
    }

    /// Rolls back an open batch transaction and returns `message`, extended
    /// with the rollback failure when there is one.
    fn abort_batch(&self, session: &mut dyn ReadingSession, message: String) -> String {
        if self.policy != CommitPolicy::Batch {
            return message;
        }
        match session.rollback_batch() {
            Ok(()) => message,
            Err(err) => format!("{message}; rollback failed: {err}"),
        }
    }
}

/// Maps a session-level storage failure to a request-fatal error.
fn unavailable(err: SinkError) -> IngestError {
    IngestError::Unavailable(err.to_string())
}
