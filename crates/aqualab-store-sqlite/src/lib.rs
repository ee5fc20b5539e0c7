// crates/aqualab-store-sqlite/src/lib.rs
// ============================================================================
// Module: AquaLab SQLite Store
// Description: Durable LabStore and AuditStore backend using SQLite.
// Purpose: Provide production persistence for samples, results, and audits.
// Dependencies: aqualab-core, rusqlite
// ============================================================================

//! ## Overview
//! This crate provides a SQLite-backed implementation of the AquaLab storage
//! interfaces. Entities are stored as JSON documents next to a SHA-256 digest
//! that is verified on every load, with indexed columns for the lookups and
//! filters the lifecycle managers need. The results table is keyed by the
//! sample's case-folded business key, so the database itself refuses a second
//! result for the same sample.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod store;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use store::MAX_DOCUMENT_BYTES;
pub use store::SqliteLabStore;
pub use store::SqliteStoreConfig;
pub use store::SqliteStoreError;
pub use store::SqliteStoreMode;
pub use store::SqliteSyncMode;
