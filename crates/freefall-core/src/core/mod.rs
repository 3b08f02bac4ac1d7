// crates/freefall-core/src/core/mod.rs
// ============================================================================
// Module: Freefall Core Types
// Description: Sensor reading records and batch outcome accounting.
// Purpose: Group the data model shared by the decoder, validator, and sinks.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! Core types describe a reading at each step of ingestion: the raw
//! [`CandidateRecord`] produced by the decoder, the typed [`SensorReading`]
//! produced by the validator, and the [`BatchOutcome`] that accounts for
//! every record of one upload.

// ============================================================================
// SECTION: Submodules
// ============================================================================

pub mod outcome;
pub mod reading;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use outcome::BatchOutcome;
pub use outcome::MAX_RECORDED_REJECTIONS;
pub use outcome::Rejection;
pub use outcome::RejectionReason;
pub use reading::CandidateRecord;
pub use reading::FIELD_COUNT;
pub use reading::FieldKind;
pub use reading::SensorField;
pub use reading::SensorReading;
