// crates/freefall-config/src/lib.rs
// ============================================================================
// Module: Freefall Config Library
// Description: Canonical config model and validation.
// Purpose: Single source of truth for freefall.toml semantics.
// Dependencies: freefall-core, freefall-store-postgres, freefall-store-sqlite, serde, toml
// ============================================================================

//! ## Overview
//! `freefall-config` defines the configuration model for the ingestion
//! service. Configuration is an explicit value built once at process start
//! and handed to the server; nothing reads the environment after loading.
//!
//! Security posture: config inputs are untrusted and validation fails closed.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod config;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use config::*;
