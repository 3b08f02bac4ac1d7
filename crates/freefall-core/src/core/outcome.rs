// crates/freefall-core/src/core/outcome.rs
// ============================================================================
// Module: Batch Outcome
// Description: Per-record rejections and aggregate batch accounting.
// Purpose: Account for every record of an upload without aborting the batch.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! A [`BatchOutcome`] is created fresh for each upload and records what
//! happened to every data line: accepted, rejected before storage, or failed
//! at insert time. Counters are exact; the retained rejection details are
//! capped at [`MAX_RECORDED_REJECTIONS`] so a hostile payload cannot grow the
//! summary without bound.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Serialize;

use crate::core::reading::SensorField;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Maximum rejection details retained per batch.
pub const MAX_RECORDED_REJECTIONS: usize = 256;

// ============================================================================
// SECTION: Rejections
// ============================================================================

/// Why a candidate record was discarded before reaching storage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RejectionReason {
    /// The line did not carry exactly eleven fields.
    WrongFieldCount {
        /// Number of fields found on the line.
        actual: usize,
    },
    /// A field could not be converted to its declared type.
    FieldConversionFailed {
        /// First field that failed conversion.
        field: SensorField,
        /// Raw text of the failing field.
        raw: String,
    },
}

impl RejectionReason {
    /// Returns true when the rejection was caused by line arity.
    #[must_use]
    pub const fn is_arity(&self) -> bool {
        matches!(self, Self::WrongFieldCount { .. })
    }
}

/// A discarded record and the first reason it failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Rejection {
    /// 1-based line number within the batch, header excluded.
    pub line: usize,
    /// First failing reason.
    pub reason: RejectionReason,
}

// ============================================================================
// SECTION: Batch Outcome
// ============================================================================

/// Aggregate result of one ingestion request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchOutcome {
    /// Rows persisted.
    pub rows_inserted: usize,
    /// Lines skipped because the field count was wrong.
    pub rows_skipped_arity: usize,
    /// Lines skipped because a field failed type conversion.
    pub rows_skipped_invalid: usize,
    /// Validated rows that failed at insert time.
    pub rows_with_errors: usize,
    /// Line numbers that failed at insert time, in payload order.
    pub failed_lines: Vec<usize>,
    /// Retained rejection details, in payload order.
    pub rejections: Vec<Rejection>,
    /// True when rejections beyond the retention cap were counted but dropped.
    pub rejections_truncated: bool,
}

impl BatchOutcome {
    /// Creates an empty outcome.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Total lines rejected before storage (arity and conversion).
    #[must_use]
    pub const fn rows_skipped(&self) -> usize {
        self.rows_skipped_arity + self.rows_skipped_invalid
    }

    /// Total data lines accounted for by this outcome.
    #[must_use]
    pub const fn records_seen(&self) -> usize {
        self.rows_inserted + self.rows_skipped() + self.rows_with_errors
    }

    /// Records a persisted row.
    pub const fn record_inserted(&mut self) {
        self.rows_inserted += 1;
    }

    /// Records a rejection, keeping detail up to the retention cap.
    pub fn record_rejection(&mut self, rejection: Rejection) {
        if rejection.reason.is_arity() {
            self.rows_skipped_arity += 1;
        } else {
            self.rows_skipped_invalid += 1;
        }
        if self.rejections.len() < MAX_RECORDED_REJECTIONS {
            self.rejections.push(rejection);
        } else {
            self.rejections_truncated = true;
        }
    }

    /// Records an insert failure for the given line.
    pub fn record_insert_failure(&mut self, line: usize) {
        self.rows_with_errors += 1;
        self.failed_lines.push(line);
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

    use super::BatchOutcome;
    use super::MAX_RECORDED_REJECTIONS;
    use super::Rejection;
    use super::RejectionReason;
    use crate::core::reading::SensorField;

    #[test]
    fn counters_split_arity_and_conversion() {
        let mut outcome = BatchOutcome::new();
        outcome.record_rejection(Rejection {
            line: 1,
            reason: RejectionReason::WrongFieldCount {
                actual: 10,
            },
        });
        outcome.record_rejection(Rejection {
            line: 2,
            reason: RejectionReason::FieldConversionFailed {
                field: SensorField::AccelX,
                raw: "abc".to_string(),
            },
        });
        outcome.record_inserted();
        outcome.record_insert_failure(4);
        assert_eq!(outcome.rows_skipped_arity, 1);
        assert_eq!(outcome.rows_skipped_invalid, 1);
        assert_eq!(outcome.rows_skipped(), 2);
        assert_eq!(outcome.records_seen(), 4);
        assert_eq!(outcome.failed_lines, vec![4]);
    }

    #[test]
    fn rejection_details_are_capped_but_counted() {
        let mut outcome = BatchOutcome::new();
        let total = MAX_RECORDED_REJECTIONS + 5;
        for line in 1 ..= total {
            outcome.record_rejection(Rejection {
                line,
                reason: RejectionReason::WrongFieldCount {
                    actual: 0,
                },
            });
        }
        assert_eq!(outcome.rows_skipped(), total);
        assert_eq!(outcome.rejections.len(), MAX_RECORDED_REJECTIONS);
        assert!(outcome.rejections_truncated);
    }
}
