// crates/freefall-core/src/lib.rs
// ============================================================================
// Module: Freefall Core Library
// Description: Public API surface for the freefall ingestion core.
// Purpose: Expose reading types, sink interfaces, and the ingestion pipeline.
// Dependencies: crate::{core, interfaces, runtime}
// ============================================================================

//! ## Overview
//! Freefall core turns an uploaded batch of delimited sensor samples into
//! persisted rows and a per-batch outcome summary. Decoding and validation
//! are pure; persistence goes through the [`ReadingStore`] interface so the
//! pipeline stays backend-agnostic. Security posture: payloads are untrusted
//! and every record is validated independently before it reaches storage.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod core;
pub mod interfaces;
pub mod runtime;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use core::*;

pub use interfaces::CommitPolicy;
pub use interfaces::ReadingSession;
pub use interfaces::ReadingStore;
pub use interfaces::SinkError;
pub use runtime::CancellationFlag;
pub use runtime::CandidateRecords;
pub use runtime::DecodeError;
pub use runtime::InMemoryReadingStore;
pub use runtime::IngestError;
pub use runtime::IngestErrorClass;
pub use runtime::IngestPipeline;
pub use runtime::SharedReadingStore;
pub use runtime::decode_payload;
pub use runtime::validate_record;
