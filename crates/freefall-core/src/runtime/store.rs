// crates/freefall-core/src/runtime/store.rs
// ============================================================================
// Module: Reading Stores
// Description: Shared store handle and an in-memory store with fault injection.
// Purpose: Provide a thread-safe store wrapper and a test/demo backend.
// Dependencies: crate::{core, interfaces}
// ============================================================================

//! ## Overview
//! [`SharedReadingStore`] wraps any backend behind an `Arc` so request
//! workers can share it. [`InMemoryReadingStore`] keeps rows in a vector and
//! can be told to reject rows, refuse connections, or drop a connection
//! after a number of inserts. Batch inserts stay private to the session
//! until commit.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;

use crate::core::SensorReading;
use crate::interfaces::ReadingSession;
use crate::interfaces::ReadingStore;
use crate::interfaces::SinkError;

// ============================================================================
// SECTION: Shared Store
// ============================================================================

/// Shared, thread-safe reading store handle.
#[derive(Clone)]
pub struct SharedReadingStore {
    /// Inner store implementation.
    inner: Arc<dyn ReadingStore + Send + Sync>,
}

impl SharedReadingStore {
    /// Wraps a store implementation in a shared handle.
    #[must_use]
    pub fn from_store(store: impl ReadingStore + Send + Sync + 'static) -> Self {
        Self {
            inner: Arc::new(store),
        }
    }
}

impl ReadingStore for SharedReadingStore {
    fn ensure_schema(&self) -> Result<(), SinkError> {
        self.inner.ensure_schema()
    }

    fn open_session(&self) -> Result<Box<dyn ReadingSession>, SinkError> {
        self.inner.open_session()
    }

    fn reachable(&self) -> Result<(), SinkError> {
        self.inner.reachable()
    }
}

// ============================================================================
// SECTION: In-Memory Store
// ============================================================================

/// Predicate deciding whether the store refuses a row.
type RowFilter = Arc<dyn Fn(&SensorReading) -> bool + Send + Sync>;

/// Mutable state behind the in-memory store.
#[derive(Default)]
struct MemoryState {
    /// Committed rows in insert order.
    rows: Vec<SensorReading>,
    /// Whether the schema has been prepared.
    schema_ready: bool,
    /// Refuse every connection when true.
    unavailable: bool,
    /// Drop the connection after this many successful inserts per session.
    disconnect_after: Option<usize>,
    /// Rows matching this predicate are rejected.
    reject_rows: Option<RowFilter>,
    /// Batch rollbacks report failure when true.
    fail_rollbacks: bool,
}

/// In-memory reading store for tests and offline runs.
#[derive(Clone, Default)]
pub struct InMemoryReadingStore {
    /// Shared state.
    state: Arc<Mutex<MemoryState>>,
}

impl InMemoryReadingStore {
    /// Creates an empty, reachable store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a snapshot of the committed rows.
    ///
    /// # Errors
    ///
    /// Returns [`SinkError::Unavailable`] when the state lock is poisoned.
    pub fn rows(&self) -> Result<Vec<SensorReading>, SinkError> {
        Ok(lock_state(&self.state)?.rows.clone())
    }

    /// Returns true once the schema has been prepared.
    ///
    /// # Errors
    ///
    /// Returns [`SinkError::Unavailable`] when the state lock is poisoned.
    pub fn schema_ready(&self) -> Result<bool, SinkError> {
        Ok(lock_state(&self.state)?.schema_ready)
    }

    /// Makes every connection attempt fail (or succeed again).
    ///
    /// # Errors
    ///
    /// Returns [`SinkError::Unavailable`] when the state lock is poisoned.
    pub fn set_unavailable(&self, unavailable: bool) -> Result<(), SinkError> {
        lock_state(&self.state)?.unavailable = unavailable;
        Ok(())
    }

    /// Drops each session's connection after `inserts` successful inserts.
    ///
    /// # Errors
    ///
    /// Returns [`SinkError::Unavailable`] when the state lock is poisoned.
    pub fn disconnect_after(&self, inserts: usize) -> Result<(), SinkError> {
        lock_state(&self.state)?.disconnect_after = Some(inserts);
        Ok(())
    }

    /// Makes batch rollbacks discard the batch but report failure.
    ///
    /// # Errors
    ///
    /// Returns [`SinkError::Unavailable`] when the state lock is poisoned.
    pub fn fail_rollbacks(&self) -> Result<(), SinkError> {
        lock_state(&self.state)?.fail_rollbacks = true;
        Ok(())
    }

    /// Rejects every row for which `predicate` returns true.
    ///
    /// # Errors
    ///
    /// Returns [`SinkError::Unavailable`] when the state lock is poisoned.
    pub fn reject_rows_where(
        &self,
        predicate: impl Fn(&SensorReading) -> bool + Send + Sync + 'static,
    ) -> Result<(), SinkError> {
        lock_state(&self.state)?.reject_rows = Some(Arc::new(predicate));
        Ok(())
    }
}

impl ReadingStore for InMemoryReadingStore {
    fn ensure_schema(&self) -> Result<(), SinkError> {
        let mut state = lock_state(&self.state)?;
        if state.unavailable {
            return Err(SinkError::Unavailable("in-memory store is offline".to_string()));
        }
        state.schema_ready = true;
        Ok(())
    }

    fn open_session(&self) -> Result<Box<dyn ReadingSession>, SinkError> {
        if lock_state(&self.state)?.unavailable {
            return Err(SinkError::Unavailable("in-memory store is offline".to_string()));
        }
        Ok(Box::new(MemorySession {
            state: Arc::clone(&self.state),
            pending: None,
            inserts: 0,
        }))
    }

    fn reachable(&self) -> Result<(), SinkError> {
        if lock_state(&self.state)?.unavailable {
            return Err(SinkError::Unavailable("in-memory store is offline".to_string()));
        }
        Ok(())
    }
}

/// One session against the in-memory store.
struct MemorySession {
    /// Shared store state.
    state: Arc<Mutex<MemoryState>>,
    /// Rows buffered by an open batch.
    pending: Option<Vec<SensorReading>>,
    /// Successful inserts on this session.
    inserts: usize,
}

impl ReadingSession for MemorySession {
    fn persist(&mut self, reading: &SensorReading) -> Result<(), SinkError> {
        let mut state = lock_state(&self.state)?;
        if state.unavailable || state.disconnect_after.is_some_and(|limit| self.inserts >= limit) {
            return Err(SinkError::Unavailable("connection lost".to_string()));
        }
        if state.reject_rows.as_ref().is_some_and(|reject| reject(reading)) {
            return Err(SinkError::RowRejected(format!(
                "row refused for session {}",
                reading.session_id
            )));
        }
        match self.pending.as_mut() {
            Some(pending) => pending.push(*reading),
            None => state.rows.push(*reading),
        }
        self.inserts += 1;
        Ok(())
    }

    fn begin_batch(&mut self) -> Result<(), SinkError> {
        self.pending = Some(Vec::new());
        Ok(())
    }

    fn commit_batch(&mut self) -> Result<(), SinkError> {
        let pending = self.pending.take().unwrap_or_default();
        lock_state(&self.state)?.rows.extend(pending);
        Ok(())
    }

    fn rollback_batch(&mut self) -> Result<(), SinkError> {
        self.pending = None;
        if lock_state(&self.state)?.fail_rollbacks {
            return Err(SinkError::Unavailable("rollback lost the connection".to_string()));
        }
        Ok(())
    }
}

/// Locks the store state, mapping poison to an unavailable store.
fn lock_state(state: &Mutex<MemoryState>) -> Result<MutexGuard<'_, MemoryState>, SinkError> {
    state.lock().map_err(|_| SinkError::Unavailable("in-memory store lock poisoned".to_string()))
}
