// crates/aqualab-core/src/core/mod.rs
// ============================================================================
// Module: AquaLab Core Types
// Description: Domain model for samples, results, identities, and audit records.
// Purpose: Group the serializable types shared by every AquaLab crate.
// Dependencies: serde, serde_json, time, base64
// ============================================================================

//! ## Overview
//! Core types keep the laboratory's external JSON field names (`idMuestra`,
//! `historial`, `verificado`, ...) on the wire while exposing English Rust
//! names. Every type here is plain data plus validation; persistence and
//! orchestration live in [`crate::interfaces`] and [`crate::runtime`].

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod audit;
pub mod error;
pub mod identifiers;
pub mod identity;
pub mod result;
pub mod roles;
pub mod sample;
pub mod time;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use audit::AuditAction;
pub use audit::AuditActor;
pub use audit::AuditDetails;
pub use audit::AuditOutcome;
pub use audit::AuditPage;
pub use audit::AuditQuery;
pub use audit::AuditQueryParams;
pub use audit::AuditRecord;
pub use error::LabError;
pub use identifiers::RecordId;
pub use identifiers::SampleId;
pub use identity::Actor;
pub use identity::DirectoryUser;
pub use identity::Identity;
pub use result::ChangeEntry;
pub use result::ChangeKind;
pub use result::CheckedValue;
pub use result::LabResult;
pub use result::Measurement;
pub use result::MeasurementInput;
pub use result::Measurements;
pub use result::Parameter;
pub use result::ResultInput;
pub use roles::Permission;
pub use roles::Role;
pub use roles::RoleClaim;
pub use roles::require_permission;
pub use roles::role_allows;
pub use sample::MAX_SIGNATURE_BYTES;
pub use sample::NewSample;
pub use sample::Sample;
pub use sample::SampleHistoryEntry;
pub use sample::SampleState;
pub use sample::SampleUpdate;
pub use sample::SignatureBlock;
pub use sample::SignatureInput;
pub use sample::SignaturePayload;
pub use sample::SignatureSlot;
pub use sample::SignatureSubmission;
pub use sample::Signatures;
pub use sample::UpdateStamp;
pub use sample::WaterType;
pub use sample::validate_signature;
pub use time::Timestamp;
