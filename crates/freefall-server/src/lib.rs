// crates/freefall-server/src/lib.rs
// ============================================================================
// Module: Freefall Server Library
// Description: HTTP surface for the freefall ingestion pipeline.
// Purpose: Expose upload, health, and index endpoints over axum.
// Dependencies: freefall-core, freefall-config, axum, tokio
// ============================================================================

//! ## Overview
//! `freefall-server` binds the ingestion pipeline to HTTP. Uploads are
//! processed on the blocking pool so database work never stalls async
//! workers, and every request emits one structured audit event.
//! Security posture: request bodies are untrusted and size-limited.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod audit;
pub mod server;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use audit::AuditSink;
pub use audit::FileAuditSink;
pub use audit::HealthAuditEvent;
pub use audit::IngestAuditEvent;
pub use audit::NoopAuditSink;
pub use audit::StartupAuditEvent;
pub use audit::StderrAuditSink;
pub use server::FreefallServer;
pub use server::ServerError;
pub use server::build_audit_sink;
pub use server::build_store;
