// crates/freefall-core/tests/decoder.rs
// ============================================================================
// Module: Record Decoder Tests
// Description: Tests for header handling, line splitting, and decode errors.
// ============================================================================
//! ## Overview
//! Validates payload-level failures and candidate record numbering.

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

use freefall_core::CandidateRecord;
use freefall_core::DecodeError;
use freefall_core::decode_payload;

fn collect(payload: &[u8]) -> Vec<CandidateRecord> {
    decode_payload(payload).expect("decode").collect()
}

#[test]
fn empty_payload_is_rejected() {
    assert_eq!(decode_payload(b"").err(), Some(DecodeError::EmptyPayload));
}

#[test]
fn whitespace_only_payload_has_no_header() {
    assert_eq!(decode_payload(b" \r\n\n\t").err(), Some(DecodeError::MissingHeader));
}

#[test]
fn invalid_utf8_is_rejected_with_offset() {
    let err = decode_payload(b"header\n\xff\xfe").err();
    assert_eq!(
        err,
        Some(DecodeError::InvalidEncoding {
            offset: 7,
        })
    );
}

#[test]
fn header_only_yields_no_records() {
    assert!(collect(b"session_id,timestamp").is_empty());
    assert!(collect(b"session_id,timestamp\n").is_empty());
}

#[test]
fn header_is_dropped_and_lines_are_numbered_from_one() {
    let records = collect(b"h\n1,2\n3,4\n");
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].line, 1);
    assert_eq!(records[0].fields, vec!["1", "2"]);
    assert_eq!(records[1].line, 2);
    assert_eq!(records[1].fields, vec!["3", "4"]);
}

#[test]
fn crlf_terminators_are_stripped() {
    let records = collect(b"h\r\n1,2\r\n3,4\r\n");
    assert_eq!(records.len(), 2);
    assert_eq!(records[1].fields, vec!["3", "4"]);
}

#[test]
fn blank_middle_line_is_a_record_without_fields() {
    let records = collect(b"h\n1,2\n\n3,4");
    assert_eq!(records.len(), 3);
    assert!(records[1].fields.is_empty());
    assert_eq!(records[2].line, 3);
}

#[test]
fn decoder_does_not_inspect_values() {
    let records = collect(b"h\nnot,numbers,at,all\n");
    assert_eq!(records[0].fields, vec!["not", "numbers", "at", "all"]);
}

#[test]
fn quoted_fields_keep_delimiters() {
    let records = collect(b"h\n\"1,5\",\"say \"\"hi\"\"\"\n");
    assert_eq!(records[0].fields, vec!["1,5", "say \"hi\""]);
}
