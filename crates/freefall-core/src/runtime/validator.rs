// crates/freefall-core/src/runtime/validator.rs
// ============================================================================
// Module: Record Validator
// Description: Converts candidate records into typed sensor readings.
// Purpose: Reject malformed records before they reach storage.
// Dependencies: crate::core
// ============================================================================

//! ## Overview
//! Validation checks arity first, then converts fields in wire order. The
//! first field that fails conversion decides the rejection. There is no
//! range or semantic check: any finite or non-finite float that parses is
//! accepted.

// ============================================================================
// SECTION: Imports
// ============================================================================

use crate::core::CandidateRecord;
use crate::core::FIELD_COUNT;
use crate::core::FieldKind;
use crate::core::Rejection;
use crate::core::RejectionReason;
use crate::core::SensorField;
use crate::core::SensorReading;

// ============================================================================
// SECTION: Validation
// ============================================================================

/// Validates one candidate record.
///
/// # Errors
///
/// Returns a [`Rejection`] carrying the record's line number when the field
/// count is wrong or a field fails type conversion.
pub fn validate_record(record: &CandidateRecord) -> Result<SensorReading, Rejection> {
    let wrong_count = || Rejection {
        line: record.line,
        reason: RejectionReason::WrongFieldCount {
            actual: record.fields.len(),
        },
    };
    if record.fields.len() != FIELD_COUNT {
        return Err(wrong_count());
    }

    let mut ids = Vec::with_capacity(2);
    let mut measurements = Vec::with_capacity(FIELD_COUNT - 2);
    for (field, raw) in SensorField::ALL.into_iter().zip(&record.fields) {
        let reject = || Rejection {
            line: record.line,
            reason: RejectionReason::FieldConversionFailed {
                field,
                raw: raw.clone(),
            },
        };
        match field.kind() {
            FieldKind::Integer => ids.push(parse_integer(raw).ok_or_else(reject)?),
            FieldKind::Float => measurements.push(parse_float(raw).ok_or_else(reject)?),
        }
    }

    let ids = <[i64; 2]>::try_from(ids).map_err(|_| wrong_count())?;
    let measurements = <[f64; 9]>::try_from(measurements).map_err(|_| wrong_count())?;
    Ok(SensorReading::from_parts(ids, measurements))
}

/// Parses a signed 64-bit integer after trimming ASCII whitespace.
fn parse_integer(raw: &str) -> Option<i64> {
    raw.trim_ascii().parse::<i64>().ok()
}

/// Parses a 64-bit float after trimming ASCII whitespace.
fn parse_float(raw: &str) -> Option<f64> {
    raw.trim_ascii().parse::<f64>().ok()
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
        clippy::float_cmp,
        reason = "Test-only assertions."
    )]

    use super::parse_float;
    use super::parse_integer;

    #[test]
    fn integer_rejects_fraction() {
        assert_eq!(parse_integer(" 42 "), Some(42));
        assert_eq!(parse_integer("1.0"), None);
    }

    #[test]
    fn float_accepts_exponent_and_trims() {
        assert_eq!(parse_float(" 9.8e0\t"), Some(9.8));
        assert_eq!(parse_float(""), None);
    }
}
