// crates/aqualab-core/src/interfaces/mod.rs
// ============================================================================
// Module: AquaLab Interfaces
// Description: Storage seams implemented by in-memory and SQLite backends.
// Purpose: Keep lifecycle managers independent of the persistence engine.
// Dependencies: crate::core, thiserror
// ============================================================================

//! ## Overview
//! Lifecycle managers talk to storage only through [`LabStore`] and
//! [`AuditStore`]. Each single-entity write is atomic; there is no
//! multi-entity transaction. Result insertion is conditional so a duplicate
//! registration is refused by the store itself even when two requests pass
//! the manager's pre-check concurrently.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;

use thiserror::Error;

use crate::core::AuditPage;
use crate::core::AuditQuery;
use crate::core::AuditRecord;
use crate::core::LabResult;
use crate::core::RecordId;
use crate::core::Sample;
use crate::core::SampleId;
use crate::core::SampleState;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Storage errors.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Store I/O error.
    #[error("lab store io error: {0}")]
    Io(String),
    /// Store data is corrupted or fails integrity checks.
    #[error("lab store corruption: {0}")]
    Corrupt(String),
    /// Store data version is incompatible.
    #[error("lab store version mismatch: {0}")]
    VersionMismatch(String),
    /// Store data is invalid.
    #[error("lab store invalid data: {0}")]
    Invalid(String),
    /// A uniqueness constraint rejected the write.
    #[error("lab store conflict: {0}")]
    Conflict(String),
    /// Store reported an error.
    #[error("lab store error: {0}")]
    Store(String),
}

// ============================================================================
// SECTION: Lab Store
// ============================================================================

/// Sample listing filter.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SampleFilter {
    /// Only samples in this state.
    pub state: Option<SampleState>,
    /// Only samples of this water type (case-insensitive).
    pub water_type: Option<String>,
}

impl SampleFilter {
    /// Returns true when `sample` passes the filter.
    #[must_use]
    pub fn matches(&self, sample: &Sample) -> bool {
        self.state.is_none_or(|state| sample.state == state)
            && self
                .water_type
                .as_deref()
                .is_none_or(|kind| sample.water_type.tipo.eq_ignore_ascii_case(kind))
    }
}

/// Persistence for samples and results.
pub trait LabStore {
    /// Inserts a new sample.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Conflict`] when the business key or record id is
    /// already taken.
    fn insert_sample(&self, sample: &Sample) -> Result<(), StoreError>;

    /// Loads a sample by internal id.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when loading fails.
    fn sample(&self, id: &RecordId) -> Result<Option<Sample>, StoreError>;

    /// Loads a sample by business key (case-insensitive).
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when loading fails.
    fn sample_by_key(&self, sample_id: &SampleId) -> Result<Option<Sample>, StoreError>;

    /// Lists samples passing `filter`, newest `fechaHora` first.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when loading fails.
    fn list_samples(&self, filter: &SampleFilter) -> Result<Vec<Sample>, StoreError>;

    /// Replaces a stored sample.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Invalid`] when the sample does not exist.
    fn update_sample(&self, sample: &Sample) -> Result<(), StoreError>;

    /// Deletes a sample and its result, returning the sample when it existed.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when deletion fails.
    fn delete_sample(&self, id: &RecordId) -> Result<Option<Sample>, StoreError>;

    /// Inserts a result if none exists for its sample.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Conflict`] when a result already exists.
    fn insert_result(&self, result: &LabResult) -> Result<(), StoreError>;

    /// Loads the result for a sample (case-insensitive).
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when loading fails.
    fn result(&self, sample_id: &SampleId) -> Result<Option<LabResult>, StoreError>;

    /// Lists every result, newest `createdAt` first.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when loading fails.
    fn list_results(&self) -> Result<Vec<LabResult>, StoreError>;

    /// Replaces a stored result.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Invalid`] when the result does not exist.
    fn update_result(&self, result: &LabResult) -> Result<(), StoreError>;
}

/// Shared lab store wrapper.
#[derive(Clone)]
pub struct SharedLabStore {
    /// Inner store implementation.
    inner: Arc<dyn LabStore + Send + Sync>,
}

impl SharedLabStore {
    /// Wraps a lab store in a shared, thread-safe wrapper.
    #[must_use]
    pub fn from_store(store: impl LabStore + Send + Sync + 'static) -> Self {
        Self {
            inner: Arc::new(store),
        }
    }

    /// Wraps an existing shared lab store.
    #[must_use]
    pub fn new(inner: Arc<dyn LabStore + Send + Sync>) -> Self {
        Self {
            inner,
        }
    }
}

impl LabStore for SharedLabStore {
    fn insert_sample(&self, sample: &Sample) -> Result<(), StoreError> {
        self.inner.insert_sample(sample)
    }

    fn sample(&self, id: &RecordId) -> Result<Option<Sample>, StoreError> {
        self.inner.sample(id)
    }

    fn sample_by_key(&self, sample_id: &SampleId) -> Result<Option<Sample>, StoreError> {
        self.inner.sample_by_key(sample_id)
    }

    fn list_samples(&self, filter: &SampleFilter) -> Result<Vec<Sample>, StoreError> {
        self.inner.list_samples(filter)
    }

    fn update_sample(&self, sample: &Sample) -> Result<(), StoreError> {
        self.inner.update_sample(sample)
    }

    fn delete_sample(&self, id: &RecordId) -> Result<Option<Sample>, StoreError> {
        self.inner.delete_sample(id)
    }

    fn insert_result(&self, result: &LabResult) -> Result<(), StoreError> {
        self.inner.insert_result(result)
    }

    fn result(&self, sample_id: &SampleId) -> Result<Option<LabResult>, StoreError> {
        self.inner.result(sample_id)
    }

    fn list_results(&self) -> Result<Vec<LabResult>, StoreError> {
        self.inner.list_results()
    }

    fn update_result(&self, result: &LabResult) -> Result<(), StoreError> {
        self.inner.update_result(result)
    }
}

// ============================================================================
// SECTION: Audit Store
// ============================================================================

/// Append-only audit persistence.
pub trait AuditStore {
    /// Appends one record.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the write fails.
    fn append(&self, record: &AuditRecord) -> Result<(), StoreError>;

    /// Returns one page of matching records, newest first.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the query fails.
    fn query(&self, query: &AuditQuery) -> Result<AuditPage, StoreError>;

    /// Returns every matching record, newest first, ignoring the page window.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the query fails.
    fn export(&self, query: &AuditQuery) -> Result<Vec<AuditRecord>, StoreError>;
}

/// Shared audit store wrapper.
#[derive(Clone)]
pub struct SharedAuditStore {
    /// Inner store implementation.
    inner: Arc<dyn AuditStore + Send + Sync>,
}

impl SharedAuditStore {
    /// Wraps an audit store in a shared, thread-safe wrapper.
    #[must_use]
    pub fn from_store(store: impl AuditStore + Send + Sync + 'static) -> Self {
        Self {
            inner: Arc::new(store),
        }
    }

    /// Wraps an existing shared audit store.
    #[must_use]
    pub fn new(inner: Arc<dyn AuditStore + Send + Sync>) -> Self {
        Self {
            inner,
        }
    }
}

impl AuditStore for SharedAuditStore {
    fn append(&self, record: &AuditRecord) -> Result<(), StoreError> {
        self.inner.append(record)
    }

    fn query(&self, query: &AuditQuery) -> Result<AuditPage, StoreError> {
        self.inner.query(query)
    }

    fn export(&self, query: &AuditQuery) -> Result<Vec<AuditRecord>, StoreError> {
        self.inner.export(query)
    }
}
