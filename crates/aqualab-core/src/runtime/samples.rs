// crates/aqualab-core/src/runtime/samples.rs
// ============================================================================
// Module: AquaLab Sample Lifecycle
// Description: Registration, lookup, update, signature, and deletion of samples.
// Purpose: Enforce sample preconditions before anything reaches storage.
// Dependencies: crate::{core, interfaces}
// ============================================================================

//! ## Overview
//! [`SampleLifecycle`] registers samples only for a confirmed administrator
//! and a confirmed client, with both signatures attached. It never changes a
//! sample's state; transitions belong to [`crate::ResultLifecycle`].
//! Directory confirmation is performed by the host, which passes the looked-up
//! records in so the core stays synchronous.

// ============================================================================
// SECTION: Imports
// ============================================================================

use crate::core::DirectoryUser;
use crate::core::Identity;
use crate::core::LabError;
use crate::core::NewSample;
use crate::core::RecordId;
use crate::core::Role;
use crate::core::Sample;
use crate::core::SampleHistoryEntry;
use crate::core::SampleId;
use crate::core::SampleState;
use crate::core::SampleUpdate;
use crate::core::SignatureBlock;
use crate::core::SignatureSlot;
use crate::core::Signatures;
use crate::core::Timestamp;
use crate::core::sample::SignatureSubmission;
use crate::core::sample::validate_signature;
use crate::interfaces::LabStore;
use crate::interfaces::SampleFilter;
use crate::interfaces::SharedLabStore;
use crate::interfaces::StoreError;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// History note written when a sample is registered.
pub const REGISTERED_NOTE: &str = "Muestra registrada inicialmente";

// ============================================================================
// SECTION: Types
// ============================================================================

/// Deletion policy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeletePolicy {
    /// Refuse to delete samples in state `Verificada`.
    pub protect_verified: bool,
}

/// Sample lifecycle manager.
#[derive(Clone)]
pub struct SampleLifecycle {
    /// Backing store.
    store: SharedLabStore,
    /// Deletion policy.
    delete_policy: DeletePolicy,
}

impl SampleLifecycle {
    /// Creates a manager with the default deletion policy.
    #[must_use]
    pub fn new(store: SharedLabStore) -> Self {
        Self::with_delete_policy(store, DeletePolicy::default())
    }

    /// Creates a manager with an explicit deletion policy.
    #[must_use]
    pub const fn with_delete_policy(store: SharedLabStore, delete_policy: DeletePolicy) -> Self {
        Self {
            store,
            delete_policy,
        }
    }

    /// Registers a new sample.
    ///
    /// `administrator` is the directory record found for the caller's document
    /// and `client` the record found for the request's client document.
    ///
    /// # Errors
    ///
    /// Returns [`LabError::Validation`] when the caller is not a confirmed
    /// administrator, the client is not a confirmed client, signatures are
    /// missing or invalid, or the business key is empty or taken.
    pub fn create(
        &self,
        request: NewSample,
        creator: &Identity,
        administrator: Option<&DirectoryUser>,
        client: Option<&DirectoryUser>,
        now: Timestamp,
    ) -> Result<Sample, LabError> {
        if creator.role != Role::Administrador {
            return Err(LabError::validation("only administrators can register samples"));
        }
        let administrator = administrator
            .filter(|record| {
                record.role == Role::Administrador && record.document == creator.document
            })
            .ok_or_else(|| LabError::validation("not authorized: administrator role required"))?;
        let client_document = request.client_document.trim();
        if client_document.is_empty() {
            return Err(LabError::validation("client document (documento) is required"));
        }
        let client = client
            .filter(|record| record.role == Role::Cliente && record.document == client_document)
            .ok_or_else(|| LabError::validation("client not found or not valid"))?;

        let signatures = signatures_from_request(&request, administrator, client, now)?;

        let sample_id = SampleId::new(&request.sample_id);
        if sample_id.is_empty() {
            return Err(LabError::validation("sample id (idMuestra) is required"));
        }
        if self.store.sample_by_key(&sample_id)?.is_some() {
            return Err(duplicate_sample(&sample_id));
        }

        let details = request.descriptive_details();
        let sample = Sample {
            id: RecordId::generate(now),
            sample_id: sample_id.clone(),
            client_document: client.document.clone(),
            sampled_at: request.sampled_at.unwrap_or(now),
            water_type: request.water_type,
            sampling_type: request.sampling_type,
            signatures,
            state: SampleState::Recibida,
            history: vec![SampleHistoryEntry {
                estado: SampleState::Recibida,
                documento: administrator.document.clone(),
                nombre: administrator.name.clone().or_else(|| creator.name.clone()),
                changed_at: now,
                observaciones: REGISTERED_NOTE.to_string(),
            }],
            created_by: creator.user_id.clone(),
            updates: Vec::new(),
            created_at: now,
            updated_at: now,
            details,
        };
        match self.store.insert_sample(&sample) {
            Ok(()) => Ok(sample),
            Err(StoreError::Conflict(_)) => Err(duplicate_sample(&sample_id)),
            Err(err) => Err(err.into()),
        }
    }

    /// Loads a sample by internal id, falling back to the business key.
    ///
    /// # Errors
    ///
    /// Returns [`LabError::NotFound`] when neither lookup matches.
    pub fn get(&self, id: &str) -> Result<Sample, LabError> {
        if let Some(record_id) = RecordId::parse(id)
            && let Some(sample) = self.store.sample(&record_id)?
        {
            return Ok(sample);
        }
        self.store
            .sample_by_key(&SampleId::new(id))?
            .ok_or_else(|| LabError::not_found(format!("sample {} not found", id.trim())))
    }

    /// Lists every sample, newest sampling time first.
    ///
    /// # Errors
    ///
    /// Returns [`LabError::Store`] when the store fails.
    pub fn list(&self) -> Result<Vec<Sample>, LabError> {
        Ok(self.store.list_samples(&SampleFilter::default())?)
    }

    /// Lists samples of one water type.
    ///
    /// # Errors
    ///
    /// Returns [`LabError::Store`] when the store fails.
    pub fn list_by_water_type(&self, water_type: &str) -> Result<Vec<Sample>, LabError> {
        let filter = SampleFilter {
            water_type: Some(water_type.trim().to_string()),
            ..SampleFilter::default()
        };
        Ok(self.store.list_samples(&filter)?)
    }

    /// Lists samples in one state.
    ///
    /// # Errors
    ///
    /// Returns [`LabError::Validation`] when `raw_state` is not a valid state.
    pub fn list_by_state(&self, raw_state: &str) -> Result<Vec<Sample>, LabError> {
        let state = SampleState::parse(raw_state).ok_or_else(|| {
            let valid: Vec<&str> = SampleState::ALL.iter().map(|state| state.as_str()).collect();
            LabError::validation(format!(
                "invalid state {raw_state}; expected one of: {}",
                valid.join(", ")
            ))
        })?;
        let filter = SampleFilter {
            state: Some(state),
            ..SampleFilter::default()
        };
        Ok(self.store.list_samples(&filter)?)
    }

    /// Updates descriptive fields, stamping `actor` as the author.
    ///
    /// # Errors
    ///
    /// Returns [`LabError::NotFound`] for unknown samples and
    /// [`LabError::Validation`] for empty patches, lifecycle fields, or
    /// patches that change nothing.
    pub fn update(
        &self,
        id: &str,
        patch: &SampleUpdate,
        actor: &Identity,
        now: Timestamp,
    ) -> Result<Sample, LabError> {
        if patch.is_empty() {
            return Err(LabError::validation("no fields to update"));
        }
        let mut sample = self.get(id)?;
        let changed = sample.apply_update(patch)?;
        if changed.is_empty() {
            return Err(LabError::validation("no changes made"));
        }
        sample.stamp_update(&actor.actor(), format!("actualizacion: {}", changed.join(", ")), now);
        self.store.update_sample(&sample)?;
        Ok(sample)
    }

    /// Registers or replaces one signature on a received sample.
    ///
    /// # Errors
    ///
    /// Returns [`LabError::NotFound`] for unknown samples and
    /// [`LabError::Validation`] when the sample has left `Recibida` or the
    /// signature is invalid.
    pub fn register_signature(
        &self,
        sample_id: &SampleId,
        submission: &SignatureSubmission,
        actor: &Identity,
        now: Timestamp,
    ) -> Result<Sample, LabError> {
        let mut sample = self
            .store
            .sample_by_key(sample_id)?
            .ok_or_else(|| LabError::not_found(format!("sample {sample_id} not found")))?;
        if sample.state != SampleState::Recibida {
            return Err(LabError::validation(format!(
                "signatures can only be registered while sample {sample_id} is {}",
                SampleState::Recibida
            )));
        }
        validate_signature(submission.tipo, &submission.firma)?;
        let block = match submission.tipo {
            SignatureSlot::Administrador => SignatureBlock {
                document: actor.document.clone(),
                name: actor.name.clone(),
                signature: submission.firma.clone(),
                signed_at: now,
            },
            SignatureSlot::Cliente => SignatureBlock {
                document: sample.client_document.clone(),
                name: None,
                signature: submission.firma.clone(),
                signed_at: now,
            },
        };
        sample.signatures.set(submission.tipo, block);
        sample.stamp_update(
            &actor.actor(),
            format!("firma {}", submission.tipo.label()),
            now,
        );
        self.store.update_sample(&sample)?;
        Ok(sample)
    }

    /// Hard-deletes a sample by internal id.
    ///
    /// # Errors
    ///
    /// Returns [`LabError::Validation`] for malformed ids or protected
    /// samples, and [`LabError::NotFound`] when nothing was deleted.
    pub fn delete(&self, raw_id: &str) -> Result<Sample, LabError> {
        let id = RecordId::parse(raw_id)
            .ok_or_else(|| LabError::validation(format!("invalid sample id: {}", raw_id.trim())))?;
        if self.delete_policy.protect_verified
            && let Some(sample) = self.store.sample(&id)?
            && sample.state == SampleState::Verificada
        {
            return Err(LabError::validation(format!(
                "sample {} is verified and cannot be deleted",
                sample.sample_id
            )));
        }
        self.store
            .delete_sample(&id)?
            .ok_or_else(|| LabError::not_found(format!("sample {id} not found")))
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Error for a taken business key.
fn duplicate_sample(sample_id: &SampleId) -> LabError {
    LabError::validation(format!("sample {sample_id} already exists"))
}

/// Validates the submitted signatures and binds them to the confirmed users.
fn signatures_from_request(
    request: &NewSample,
    administrator: &DirectoryUser,
    client: &DirectoryUser,
    now: Timestamp,
) -> Result<Signatures, LabError> {
    let Some(input) = &request.firmas else {
        return Err(LabError::validation("signatures are required"));
    };
    let administrator_signature = input
        .administrator
        .as_ref()
        .and_then(|payload| payload.firma.as_deref())
        .ok_or_else(|| LabError::validation("administrator signature is required"))?;
    let client_signature = input
        .client
        .as_ref()
        .and_then(|payload| payload.firma.as_deref())
        .ok_or_else(|| LabError::validation("client signature is required"))?;
    validate_signature(SignatureSlot::Administrador, administrator_signature)?;
    validate_signature(SignatureSlot::Cliente, client_signature)?;
    Ok(Signatures {
        administrador: Some(SignatureBlock {
            document: administrator.document.clone(),
            name: administrator.name.clone(),
            signature: administrator_signature.to_string(),
            signed_at: now,
        }),
        cliente: Some(SignatureBlock {
            document: client.document.clone(),
            name: client.name.clone(),
            signature: client_signature.to_string(),
            signed_at: now,
        }),
    })
}
