// crates/aqualab-core/src/runtime/store.rs
// ============================================================================
// Module: AquaLab In-Memory Stores
// Description: Mutex-guarded in-memory lab and audit stores.
// Purpose: Provide deterministic stores for tests and single-process runs.
// Dependencies: crate::core, crate::interfaces
// ============================================================================

//! ## Overview
//! In-memory implementations of [`LabStore`] and [`AuditStore`]. All state
//! sits behind one mutex per store, so conditional inserts are atomic. Data is
//! lost on restart; use the SQLite backend for durable deployments.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;

use crate::core::AuditPage;
use crate::core::AuditQuery;
use crate::core::AuditRecord;
use crate::core::LabResult;
use crate::core::RecordId;
use crate::core::Sample;
use crate::core::SampleId;
use crate::interfaces::AuditStore;
use crate::interfaces::LabStore;
use crate::interfaces::SampleFilter;
use crate::interfaces::StoreError;

// ============================================================================
// SECTION: Lab Store
// ============================================================================

/// Collections held by [`InMemoryLabStore`].
#[derive(Debug, Default)]
struct LabState {
    /// Samples keyed by record id.
    samples: BTreeMap<RecordId, Sample>,
    /// Business key index: lowercase key to record id.
    sample_keys: BTreeMap<String, RecordId>,
    /// Results keyed by lowercase sample key.
    results: BTreeMap<String, LabResult>,
}

/// In-memory lab store for tests and local runs.
#[derive(Debug, Default, Clone)]
pub struct InMemoryLabStore {
    /// State protected by a mutex.
    state: Arc<Mutex<LabState>>,
}

impl InMemoryLabStore {
    /// Creates an empty in-memory lab store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Locks the state, mapping poisoning to a store error.
    fn lock(&self) -> Result<MutexGuard<'_, LabState>, StoreError> {
        self.state.lock().map_err(|_| StoreError::Store("lab store mutex poisoned".to_string()))
    }
}

impl LabStore for InMemoryLabStore {
    fn insert_sample(&self, sample: &Sample) -> Result<(), StoreError> {
        let mut guard = self.lock()?;
        let key = sample.sample_id.key();
        if guard.sample_keys.contains_key(&key) {
            return Err(StoreError::Conflict(format!("sample {} already exists", sample.sample_id)));
        }
        if guard.samples.contains_key(&sample.id) {
            return Err(StoreError::Conflict(format!("record {} already exists", sample.id)));
        }
        guard.sample_keys.insert(key, sample.id.clone());
        guard.samples.insert(sample.id.clone(), sample.clone());
        Ok(())
    }

    fn sample(&self, id: &RecordId) -> Result<Option<Sample>, StoreError> {
        Ok(self.lock()?.samples.get(id).cloned())
    }

    fn sample_by_key(&self, sample_id: &SampleId) -> Result<Option<Sample>, StoreError> {
        let guard = self.lock()?;
        Ok(guard.sample_keys.get(&sample_id.key()).and_then(|id| guard.samples.get(id)).cloned())
    }

    fn list_samples(&self, filter: &SampleFilter) -> Result<Vec<Sample>, StoreError> {
        let guard = self.lock()?;
        let mut samples: Vec<Sample> =
            guard.samples.values().filter(|sample| filter.matches(sample)).cloned().collect();
        drop(guard);
        samples.sort_by(|a, b| {
            b.sampled_at.cmp(&a.sampled_at).then_with(|| b.created_at.cmp(&a.created_at))
        });
        Ok(samples)
    }

    fn update_sample(&self, sample: &Sample) -> Result<(), StoreError> {
        let mut guard = self.lock()?;
        let Some(existing) = guard.samples.get_mut(&sample.id) else {
            return Err(StoreError::Invalid(format!("sample {} does not exist", sample.id)));
        };
        if existing.sample_id.key() != sample.sample_id.key() {
            return Err(StoreError::Invalid("sample business key cannot change".to_string()));
        }
        *existing = sample.clone();
        Ok(())
    }

    fn delete_sample(&self, id: &RecordId) -> Result<Option<Sample>, StoreError> {
        let mut guard = self.lock()?;
        let removed = guard.samples.remove(id);
        if let Some(sample) = &removed {
            let key = sample.sample_id.key();
            guard.results.remove(&key);
            guard.sample_keys.remove(&key);
        }
        Ok(removed)
    }

    fn insert_result(&self, result: &LabResult) -> Result<(), StoreError> {
        let mut guard = self.lock()?;
        let key = result.sample_id.key();
        if guard.results.contains_key(&key) {
            return Err(StoreError::Conflict(format!(
                "result for sample {} already exists",
                result.sample_id
            )));
        }
        guard.results.insert(key, result.clone());
        Ok(())
    }

    fn result(&self, sample_id: &SampleId) -> Result<Option<LabResult>, StoreError> {
        Ok(self.lock()?.results.get(&sample_id.key()).cloned())
    }

    fn list_results(&self) -> Result<Vec<LabResult>, StoreError> {
        let guard = self.lock()?;
        let mut results: Vec<LabResult> = guard.results.values().cloned().collect();
        drop(guard);
        results.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(results)
    }

    fn update_result(&self, result: &LabResult) -> Result<(), StoreError> {
        let mut guard = self.lock()?;
        let Some(existing) = guard.results.get_mut(&result.sample_id.key()) else {
            return Err(StoreError::Invalid(format!(
                "result for sample {} does not exist",
                result.sample_id
            )));
        };
        *existing = result.clone();
        Ok(())
    }
}

// ============================================================================
// SECTION: Audit Store
// ============================================================================

/// In-memory append-only audit store.
#[derive(Debug, Default, Clone)]
pub struct InMemoryAuditStore {
    /// Records in append order.
    records: Arc<Mutex<Vec<AuditRecord>>>,
}

impl InMemoryAuditStore {
    /// Creates an empty in-memory audit store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns matching records, newest first.
    fn matching(&self, query: &AuditQuery) -> Result<Vec<AuditRecord>, StoreError> {
        let guard = self
            .records
            .lock()
            .map_err(|_| StoreError::Store("audit store mutex poisoned".to_string()))?;
        let mut matching: Vec<AuditRecord> =
            guard.iter().rev().filter(|record| query.matches(record)).cloned().collect();
        drop(guard);
        matching.sort_by(|a, b| b.fecha.cmp(&a.fecha));
        Ok(matching)
    }
}

impl AuditStore for InMemoryAuditStore {
    fn append(&self, record: &AuditRecord) -> Result<(), StoreError> {
        self.records
            .lock()
            .map_err(|_| StoreError::Store("audit store mutex poisoned".to_string()))?
            .push(record.clone());
        Ok(())
    }

    fn query(&self, query: &AuditQuery) -> Result<AuditPage, StoreError> {
        let matching = self.matching(query)?;
        let total = u64::try_from(matching.len())
            .map_err(|_| StoreError::Invalid("audit record count overflow".to_string()))?;
        let offset = usize::try_from(query.offset()).unwrap_or(usize::MAX);
        let limit = usize::try_from(query.limit).unwrap_or(usize::MAX);
        let page = matching.into_iter().skip(offset).take(limit).collect();
        Ok(AuditPage::new(page, total, query))
    }

    fn export(&self, query: &AuditQuery) -> Result<Vec<AuditRecord>, StoreError> {
        self.matching(query)
    }
}
