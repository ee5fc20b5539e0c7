// crates/aqualab-core/src/lib.rs
// ============================================================================
// Module: AquaLab Core Library
// Description: Public API surface for the AquaLab core.
// Purpose: Expose domain types, storage interfaces, and lifecycle managers.
// Dependencies: crate::{core, interfaces, runtime}
// ============================================================================

//! ## Overview
//! AquaLab core owns the water-sample and lab-result lifecycle: the permission
//! table, the guards that sit in front of every mutation, and the append-only
//! history each entity carries. It is transport-agnostic and never reads the
//! wall clock; hosts pass explicit [`Timestamp`] values into every mutating
//! operation.

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

pub use interfaces::AuditStore;
pub use interfaces::LabStore;
pub use interfaces::SampleFilter;
pub use interfaces::SharedAuditStore;
pub use interfaces::SharedLabStore;
pub use interfaces::StoreError;
pub use runtime::DeletePolicy;
pub use runtime::InMemoryAuditStore;
pub use runtime::InMemoryLabStore;
pub use runtime::ResultLifecycle;
pub use runtime::ResultTransition;
pub use runtime::SampleLifecycle;
