// crates/aqualab-config/src/lib.rs
// ============================================================================
// Module: AquaLab Config Library
// Description: Configuration model and validation for the lab service.
// Purpose: Single source of truth for aqualab.toml semantics.
// Dependencies: aqualab-core, aqualab-store-sqlite, serde, toml
// ============================================================================

//! ## Overview
//! `aqualab-config` defines the configuration model for the AquaLab service.
//! Loading is bounded (size, path length, UTF-8) and validation is
//! fail-closed: any inconsistent section rejects the whole file.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod config;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use config::*;
