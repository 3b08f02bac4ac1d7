// crates/freefall-store-sqlite/src/lib.rs
// ============================================================================
// Module: SQLite Reading Store
// Description: Reading store backend using SQLite WAL.
// Purpose: Provide a file-backed store for local development and tests.
// Dependencies: freefall-core, rusqlite
// ============================================================================

//! ## Overview
//! This crate provides a SQLite-backed [`freefall_core::ReadingStore`]. Each
//! request session opens its own connection, so sessions never share
//! transaction state. Column order and type classes match the production
//! `PostgreSQL` table.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod store;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use store::SqliteJournalMode;
pub use store::SqliteReadingStore;
pub use store::SqliteStoreConfig;
pub use store::SqliteStoreError;
pub use store::SqliteSyncMode;
