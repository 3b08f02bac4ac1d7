// crates/freefall-core/src/runtime/mod.rs
// ============================================================================
// Module: Freefall Runtime
// Description: Decoder, validator, orchestrator, and in-memory store.
// Purpose: Execute one upload from raw bytes to a batch outcome.
// Dependencies: crate::{core, interfaces}
// ============================================================================

//! ## Overview
//! The runtime composes the pure decoder and validator with a
//! [`crate::interfaces::ReadingStore`] to ingest one payload at a time.

// ============================================================================
// SECTION: Submodules
// ============================================================================

pub mod decoder;
pub mod ingest;
pub mod store;
pub mod validator;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use decoder::CandidateRecords;
pub use decoder::DecodeError;
pub use decoder::FIELD_DELIMITER;
pub use decoder::decode_payload;
pub use ingest::CancellationFlag;
pub use ingest::IngestError;
pub use ingest::IngestErrorClass;
pub use ingest::IngestPipeline;
pub use store::InMemoryReadingStore;
pub use store::SharedReadingStore;
pub use validator::validate_record;
