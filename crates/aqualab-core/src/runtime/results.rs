// crates/aqualab-core/src/runtime/results.rs
// ============================================================================
// Module: AquaLab Result Lifecycle
// Description: Registration, editing, and verification of lab results.
// Purpose: Enforce author/verifier separation and drive sample transitions.
// Dependencies: crate::{core, interfaces}
// ============================================================================

//! ## Overview
//! Guards run in a fixed order and the first failure aborts the operation:
//!
//! - register: technician role, sample exists, sample signed, sample
//!   `Recibida`, no result yet, at least one value, values in range.
//! - edit: technician role, result exists, not verified, caller is the
//!   author, values in range, something actually changed.
//! - verify: technician role, result exists, caller is not the author, not
//!   yet verified, sample `En análisis`.
//!
//! Registration writes the result before moving the sample. The store
//! refuses a second result for the same sample, so two concurrent
//! registrations cannot both succeed.

// ============================================================================
// SECTION: Imports
// ============================================================================

use crate::core::Identity;
use crate::core::LabError;
use crate::core::LabResult;
use crate::core::Measurements;
use crate::core::RecordId;
use crate::core::ResultInput;
use crate::core::Role;
use crate::core::Sample;
use crate::core::SampleId;
use crate::core::SampleState;
use crate::core::Timestamp;
use crate::core::result::ChangeEntry;
use crate::core::result::ChangeKind;
use crate::interfaces::LabStore;
use crate::interfaces::SharedLabStore;
use crate::interfaces::StoreError;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Sample history note written when results are registered.
pub const RESULTS_REGISTERED_NOTE: &str = "Resultados registrados";
/// Sample history note written when results are verified.
pub const RESULTS_VERIFIED_NOTE: &str = "Resultados verificados";

// ============================================================================
// SECTION: Types
// ============================================================================

/// Result lifecycle manager.
#[derive(Clone)]
pub struct ResultLifecycle {
    /// Backing store.
    store: SharedLabStore,
}

/// Outcome of an operation that moved the owning sample.
#[derive(Debug, Clone)]
pub struct ResultTransition {
    /// Result after the operation.
    pub result: LabResult,
    /// Sample after the transition.
    pub sample: Sample,
}

impl ResultLifecycle {
    /// Creates a result lifecycle manager.
    #[must_use]
    pub const fn new(store: SharedLabStore) -> Self {
        Self {
            store,
        }
    }

    /// Registers the result for a sample and moves it to `En análisis`.
    ///
    /// # Errors
    ///
    /// Returns [`LabError::Authorization`] for non-technicians and
    /// [`LabError::Validation`] for every failed precondition.
    pub fn register(
        &self,
        sample_id: &SampleId,
        input: &ResultInput,
        technician: &Identity,
        now: Timestamp,
    ) -> Result<ResultTransition, LabError> {
        require_technician(technician, "register results")?;
        let mut sample = self.store.sample_by_key(sample_id)?.ok_or_else(|| {
            LabError::validation(format!("sample {sample_id} does not exist"))
        })?;
        if !sample.signatures.is_complete() {
            return Err(LabError::validation(format!(
                "sample {sample_id} requires administrator and client signatures before \
                 results can be registered"
            )));
        }
        if sample.state != SampleState::Recibida {
            return Err(LabError::validation(format!(
                "sample {sample_id} must be in state {} to register results (current: {})",
                SampleState::Recibida,
                sample.state
            )));
        }
        if self.store.result(sample_id)?.is_some() {
            return Err(duplicate_result(sample_id));
        }
        if !input.has_any_value() {
            return Err(LabError::validation("at least one parameter value is required"));
        }
        let values = input.checked_values()?;

        let actor = technician.actor();
        let mut measurements = Measurements::default();
        for value in &values {
            measurements.merge(value.parameter, value.value, None);
        }
        let result = LabResult {
            id: RecordId::generate(now),
            sample_id: sample.sample_id.clone(),
            client_document: sample.client_document.clone(),
            sampled_at: sample.sampled_at,
            sampling_type: sample.sampling_type.clone(),
            measurements,
            observaciones: input
                .observaciones
                .as_deref()
                .map(str::trim)
                .filter(|notes| !notes.is_empty())
                .map(str::to_string),
            verificado: false,
            author_document: technician.document.clone(),
            author_name: technician.name.clone(),
            changes: vec![ChangeEntry::new(&actor, ChangeKind::Registro, now, Vec::new())],
            created_at: now,
            updated_at: now,
        };
        sample.advance(SampleState::EnAnalisis, &actor, RESULTS_REGISTERED_NOTE, now)?;
        match self.store.insert_result(&result) {
            Ok(()) => {}
            Err(StoreError::Conflict(_)) => return Err(duplicate_result(sample_id)),
            Err(err) => return Err(err.into()),
        }
        self.store.update_sample(&sample)?;
        Ok(ResultTransition {
            result,
            sample,
        })
    }

    /// Edits an unverified result on behalf of its author.
    ///
    /// # Errors
    ///
    /// Returns [`LabError::NotFound`] when no result exists,
    /// [`LabError::Authorization`] when the caller is not the author, and
    /// [`LabError::Validation`] when the result is verified, a value is out
    /// of range, or nothing changed.
    pub fn edit(
        &self,
        sample_id: &SampleId,
        input: &ResultInput,
        technician: &Identity,
        now: Timestamp,
    ) -> Result<LabResult, LabError> {
        require_technician(technician, "edit results")?;
        let mut result = self.store.result(sample_id)?.ok_or_else(|| {
            LabError::not_found(format!("no results found for sample {sample_id}"))
        })?;
        if result.verificado {
            return Err(LabError::validation("results are already verified and cannot be edited"));
        }
        if result.author_document != technician.document {
            return Err(LabError::authorization(
                "only the technician who registered the results may edit them",
            ));
        }
        let values = input.checked_values()?;
        let notes = input.observaciones.as_deref().map(str::trim).filter(|notes| !notes.is_empty());
        let changed = result.apply_edit(&values, notes);
        if changed.is_empty() {
            return Err(LabError::validation("no changes made"));
        }
        result.changes.push(ChangeEntry::new(&technician.actor(), ChangeKind::Edicion, now, changed));
        result.updated_at = now;
        self.store.update_result(&result)?;
        Ok(result)
    }

    /// Verifies a result and moves its sample to `Verificada`.
    ///
    /// # Errors
    ///
    /// Returns [`LabError::Validation`] when the result is missing, the caller
    /// authored it, it is already verified, or the sample is not in analysis;
    /// [`LabError::NotFound`] when the owning sample no longer exists.
    pub fn verify(
        &self,
        sample_id: &SampleId,
        technician: &Identity,
        now: Timestamp,
    ) -> Result<ResultTransition, LabError> {
        require_technician(technician, "verify results")?;
        let mut result = self.store.result(sample_id)?.ok_or_else(|| {
            LabError::validation(format!("no results found for sample {sample_id}"))
        })?;
        if result.author_document == technician.document {
            return Err(LabError::validation("you cannot verify your own results"));
        }
        if result.verificado {
            return Err(LabError::validation("results are already verified"));
        }
        let mut sample = self
            .store
            .sample_by_key(sample_id)?
            .ok_or_else(|| LabError::not_found(format!("sample {sample_id} not found")))?;
        let actor = technician.actor();
        sample.advance(SampleState::Verificada, &actor, RESULTS_VERIFIED_NOTE, now)?;
        result.verificado = true;
        result.changes.push(ChangeEntry::new(&actor, ChangeKind::Verificacion, now, Vec::new()));
        result.updated_at = now;
        self.store.update_result(&result)?;
        self.store.update_sample(&sample)?;
        Ok(ResultTransition {
            result,
            sample,
        })
    }

    /// Lists every result, newest first.
    ///
    /// # Errors
    ///
    /// Returns [`LabError::Store`] when the store fails.
    pub fn list(&self) -> Result<Vec<LabResult>, LabError> {
        Ok(self.store.list_results()?)
    }

    /// Loads the result for a sample.
    ///
    /// # Errors
    ///
    /// Returns [`LabError::NotFound`] when no result exists.
    pub fn get(&self, sample_id: &SampleId) -> Result<LabResult, LabError> {
        self.store
            .result(sample_id)?
            .ok_or_else(|| LabError::not_found(format!("no results found for sample {sample_id}")))
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Requires the lab technician role.
fn require_technician(identity: &Identity, action: &str) -> Result<(), LabError> {
    if identity.role == Role::Laboratorista {
        return Ok(());
    }
    Err(LabError::authorization(format!("only lab technicians may {action}")))
}

/// Error for a sample that already has results.
fn duplicate_result(sample_id: &SampleId) -> LabError {
    LabError::validation(format!("sample {sample_id} already has registered results"))
}
