// crates/aqualab-core/src/runtime/mod.rs
// ============================================================================
// Module: AquaLab Runtime
// Description: Lifecycle managers and the in-memory store.
// Purpose: Orchestrate guards, entity mutation, and persistence.
// Dependencies: crate::{core, interfaces}
// ============================================================================

//! ## Overview
//! The runtime hosts the two lifecycle managers. [`SampleLifecycle`] owns
//! registration, lookup, descriptive updates, signatures, and deletion.
//! [`ResultLifecycle`] owns result registration, edits, and verification and
//! is the only component that drives sample state transitions.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod results;
pub mod samples;
pub mod store;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use results::ResultLifecycle;
pub use results::ResultTransition;
pub use samples::DeletePolicy;
pub use samples::SampleLifecycle;
pub use store::InMemoryAuditStore;
pub use store::InMemoryLabStore;
