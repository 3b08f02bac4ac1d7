// crates/freefall-store-postgres/src/lib.rs
// ============================================================================
// Module: Postgres Reading Store
// Description: Production reading store backend using PostgreSQL.
// Purpose: Persist readings through a bounded connection pool.
// Dependencies: freefall-core, postgres, r2d2, r2d2_postgres
// ============================================================================

//! ## Overview
//! This crate provides a PostgreSQL-backed [`freefall_core::ReadingStore`].
//! Sessions borrow one pooled connection for the lifetime of a request and
//! return it on drop. Reachability probes bypass the pool and open a fresh
//! connection so a healthy pool cannot mask an unreachable server.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod store;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use store::PostgresReadingStore;
pub use store::PostgresStoreConfig;
pub use store::PostgresStoreError;
