// crates/freefall-core/src/interfaces/mod.rs
// ============================================================================
// Module: Freefall Interfaces
// Description: Backend-agnostic storage sink interfaces.
// Purpose: Define the contract between the ingestion pipeline and storage.
// Dependencies: crate::core, serde, thiserror
// ============================================================================

//! ## Overview
//! Storage backends implement [`ReadingStore`], which prepares the schema,
//! answers reachability, and hands out one [`ReadingSession`] per request.
//! A session owns exactly one connection and releases it when dropped, so
//! every exit path of a request returns the connection.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

use crate::core::SensorReading;

// ============================================================================
// SECTION: Commit Policy
// ============================================================================

/// Durability policy applied to the rows of one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum CommitPolicy {
    /// Each row commits on its own; an insert failure affects only that row.
    #[default]
    PerRow,
    /// All rows share one transaction; the first insert failure aborts the batch.
    Batch,
}

impl CommitPolicy {
    /// Returns a stable label for the policy.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::PerRow => "per_row",
            Self::Batch => "batch",
        }
    }
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Storage sink errors.
///
/// # Invariants
/// - [`SinkError::Unavailable`] always aborts the request.
/// - [`SinkError::RowRejected`] is record-local under [`CommitPolicy::PerRow`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SinkError {
    /// The store could not be reached or the connection was lost.
    #[error("storage unavailable: {0}")]
    Unavailable(String),
    /// The store refused a single row.
    #[error("row rejected by storage: {0}")]
    RowRejected(String),
    /// The destination table could not be prepared.
    #[error("storage schema error: {0}")]
    Schema(String),
}

impl SinkError {
    /// Returns true when the failure is scoped to one row.
    #[must_use]
    pub const fn is_row_local(&self) -> bool {
        matches!(self, Self::RowRejected(_))
    }
}

// ============================================================================
// SECTION: Store Interfaces
// ============================================================================

/// Relational store holding persisted readings.
pub trait ReadingStore {
    /// Idempotently creates the destination table.
    ///
    /// # Errors
    ///
    /// Returns [`SinkError`] when the schema cannot be prepared.
    fn ensure_schema(&self) -> Result<(), SinkError>;

    /// Acquires one connection for the lifetime of a request.
    ///
    /// # Errors
    ///
    /// Returns [`SinkError::Unavailable`] when no connection can be acquired
    /// within the configured timeout.
    fn open_session(&self) -> Result<Box<dyn ReadingSession>, SinkError>;

    /// Opens and immediately closes a fresh connection.
    ///
    /// # Errors
    ///
    /// Returns [`SinkError::Unavailable`] when the store cannot be reached.
    fn reachable(&self) -> Result<(), SinkError>;
}

/// One request's exclusive connection to the store.
///
/// Dropping a session releases its connection and discards any uncommitted
/// batch transaction.
pub trait ReadingSession {
    /// Inserts one reading as one row.
    ///
    /// Outside a batch the row commits on its own.
    ///
    /// # Errors
    ///
    /// Returns [`SinkError`] when the row cannot be inserted.
    fn persist(&mut self, reading: &SensorReading) -> Result<(), SinkError>;

    /// Opens a transaction covering subsequent persists.
    ///
    /// # Errors
    ///
    /// Returns [`SinkError`] when the transaction cannot be opened.
    fn begin_batch(&mut self) -> Result<(), SinkError>;

    /// Commits the open batch transaction.
    ///
    /// # Errors
    ///
    /// Returns [`SinkError`] when the commit fails.
    fn commit_batch(&mut self) -> Result<(), SinkError>;

    /// Rolls back the open batch transaction.
    ///
    /// # Errors
    ///
    /// Returns [`SinkError`] when the rollback fails.
    fn rollback_batch(&mut self) -> Result<(), SinkError>;
}
