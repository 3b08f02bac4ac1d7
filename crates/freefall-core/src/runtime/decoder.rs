// crates/freefall-core/src/runtime/decoder.rs
// ============================================================================
// Module: Record Decoder
// Description: Splits an uploaded payload into candidate records.
// Purpose: Strip the header line and produce raw fields per data line.
// Dependencies: crate::core, thiserror
// ============================================================================

//! ## Overview
//! The decoder never inspects field values; it only splits lines and fields
//! and drops exactly one leading header line. Fields are separated by
//! [`FIELD_DELIMITER`]. A field that starts with a double quote may contain
//! the delimiter, and `""` inside a quoted field is a literal quote. Quoted
//! fields cannot span lines. Security posture: payload bytes are untrusted;
//! decoding allocates only per line and never recurses.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::str::Lines;

use thiserror::Error;

use crate::core::CandidateRecord;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Field delimiter for sample lines.
pub const FIELD_DELIMITER: char = ',';
/// Quote character for fields containing the delimiter.
const QUOTE: char = '"';

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Payload-level decode failures. All are request-fatal client errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// The payload carried no bytes.
    #[error("payload is empty")]
    EmptyPayload,
    /// The payload carried no consumable header line.
    #[error("payload is missing a header line")]
    MissingHeader,
    /// The payload is not valid UTF-8.
    #[error("payload is not valid utf-8 (first invalid byte at offset {offset})")]
    InvalidEncoding {
        /// Byte offset of the first invalid sequence.
        offset: usize,
    },
}

// ============================================================================
// SECTION: Decoder
// ============================================================================

/// Lazy, single-pass sequence of candidate records borrowed from a payload.
#[derive(Debug)]
pub struct CandidateRecords<'a> {
    /// Remaining data lines after the header.
    lines: Lines<'a>,
    /// Line number of the next record (1-based, header excluded).
    next_line: usize,
}

impl Iterator for CandidateRecords<'_> {
    type Item = CandidateRecord;

    fn next(&mut self) -> Option<Self::Item> {
        let text = self.lines.next()?;
        let line = self.next_line;
        self.next_line += 1;
        Some(CandidateRecord {
            line,
            fields: split_fields(text),
        })
    }
}

/// Decodes a raw payload into candidate records, consuming the header line.
///
/// # Errors
///
/// Returns [`DecodeError`] when the payload is empty, not UTF-8, or has no
/// header line.
pub fn decode_payload(payload: &[u8]) -> Result<CandidateRecords<'_>, DecodeError> {
    if payload.is_empty() {
        return Err(DecodeError::EmptyPayload);
    }
    let text = std::str::from_utf8(payload).map_err(|err| DecodeError::InvalidEncoding {
        offset: err.valid_up_to(),
    })?;
    if text.trim().is_empty() {
        return Err(DecodeError::MissingHeader);
    }
    let mut lines = text.lines();
    if lines.next().is_none() {
        return Err(DecodeError::MissingHeader);
    }
    Ok(CandidateRecords {
        lines,
        next_line: 1,
    })
}

/// Splits one line into raw fields.
///
/// A blank line yields no fields at all.
fn split_fields(line: &str) -> Vec<String> {
    if line.is_empty() {
        return Vec::new();
    }
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut field_started = false;
    let mut chars = line.chars().peekable();
    while let Some(ch) = chars.next() {
        if in_quotes {
            if ch == QUOTE {
                if chars.peek() == Some(&QUOTE) {
                    current.push(QUOTE);
                    chars.next();
                } else {
                    in_quotes = false;
                }
            } else {
                current.push(ch);
            }
        } else if ch == FIELD_DELIMITER {
            fields.push(std::mem::take(&mut current));
            field_started = false;
        } else if ch == QUOTE && !field_started {
            in_quotes = true;
            field_started = true;
        } else {
            current.push(ch);
            field_started = true;
        }
    }
    fields.push(current);
    fields
}

// ============================================================================
// SECTION: Tests
// ============================================================================
