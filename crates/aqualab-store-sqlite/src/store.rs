// crates/aqualab-store-sqlite/src/store.rs
// ============================================================================
// Module: SQLite Lab Store
// Description: Durable LabStore and AuditStore backed by SQLite WAL.
// Purpose: Persist samples, results, and audit records with integrity checks.
// Dependencies: aqualab-core, rusqlite, serde, serde_json, sha2, thiserror
// ============================================================================

//! ## Overview
//! This module implements [`LabStore`] and [`AuditStore`] using `SQLite`.
//! Each entity is serialized to JSON and stored with its SHA-256 digest; loads
//! recompute the digest and fail closed on mismatch. Indexed columns mirror
//! the fields used for lookups and filters. Database contents are treated as
//! untrusted input.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt::Write as _;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;

use aqualab_core::AuditPage;
use aqualab_core::AuditQuery;
use aqualab_core::AuditRecord;
use aqualab_core::AuditStore;
use aqualab_core::LabResult;
use aqualab_core::LabStore;
use aqualab_core::RecordId;
use aqualab_core::Sample;
use aqualab_core::SampleFilter;
use aqualab_core::SampleId;
use aqualab_core::StoreError;
use rusqlite::Connection;
use rusqlite::ErrorCode;
use rusqlite::OpenFlags;
use rusqlite::OptionalExtension;
use rusqlite::params;
use rusqlite::params_from_iter;
use rusqlite::types::Value as SqlValue;
use serde::Deserialize;
use serde::Serialize;
use serde::de::DeserializeOwned;
use sha2::Digest;
use sha2::Sha256;
use thiserror::Error;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// `SQLite` schema version for the store.
const SCHEMA_VERSION: i64 = 1;
/// Default busy timeout (ms).
const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;
/// Maximum length of a single path component.
const MAX_PATH_COMPONENT_LENGTH: usize = 255;
/// Maximum total path length.
const MAX_TOTAL_PATH_LENGTH: usize = 4096;
/// Maximum stored JSON document size.
pub const MAX_DOCUMENT_BYTES: usize = 64 * 1024 * 1024;

// ============================================================================
// SECTION: Config
// ============================================================================

/// `SQLite` journal mode configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SqliteStoreMode {
    /// WAL journal mode (recommended).
    #[default]
    Wal,
    /// Delete journal mode (legacy).
    Delete,
}

impl SqliteStoreMode {
    /// Returns the `SQLite` pragma value.
    #[must_use]
    pub const fn pragma_value(self) -> &'static str {
        match self {
            Self::Wal => "wal",
            Self::Delete => "delete",
        }
    }
}

/// `SQLite` sync mode configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SqliteSyncMode {
    /// Full synchronous mode (safest).
    #[default]
    Full,
    /// Normal synchronous mode (balanced).
    Normal,
}

impl SqliteSyncMode {
    /// Returns the `SQLite` pragma value.
    #[must_use]
    pub const fn pragma_value(self) -> &'static str {
        match self {
            Self::Full => "full",
            Self::Normal => "normal",
        }
    }
}

/// Configuration for the `SQLite` lab store.
#[derive(Debug, Clone, Deserialize)]
pub struct SqliteStoreConfig {
    /// Path to the `SQLite` database file.
    pub path: PathBuf,
    /// Busy timeout in milliseconds.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
    /// `SQLite` journal mode.
    #[serde(default)]
    pub journal_mode: SqliteStoreMode,
    /// `SQLite` sync mode.
    #[serde(default)]
    pub sync_mode: SqliteSyncMode,
}

impl SqliteStoreConfig {
    /// Builds a configuration with defaults for everything but the path.
    #[must_use]
    pub fn at_path(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
            journal_mode: SqliteStoreMode::default(),
            sync_mode: SqliteSyncMode::default(),
        }
    }
}

/// Returns the default busy timeout for `SQLite` connections.
const fn default_busy_timeout_ms() -> u64 {
    DEFAULT_BUSY_TIMEOUT_MS
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// `SQLite` store errors.
#[derive(Debug, Error)]
pub enum SqliteStoreError {
    /// Store I/O error.
    #[error("sqlite store io error: {0}")]
    Io(String),
    /// `SQLite` engine error.
    #[error("sqlite store db error: {0}")]
    Db(String),
    /// Store corruption or hash mismatch.
    #[error("sqlite store corruption: {0}")]
    Corrupt(String),
    /// Store schema version mismatch.
    #[error("sqlite store version mismatch: {0}")]
    VersionMismatch(String),
    /// Invalid store data.
    #[error("sqlite store invalid data: {0}")]
    Invalid(String),
    /// Uniqueness constraint violation.
    #[error("sqlite store conflict: {0}")]
    Conflict(String),
    /// Stored document exceeded size limits.
    #[error("sqlite store document too large: {actual_bytes} bytes (max {max_bytes})")]
    TooLarge {
        /// Maximum allowed bytes.
        max_bytes: usize,
        /// Actual document size in bytes.
        actual_bytes: usize,
    },
}

impl From<SqliteStoreError> for StoreError {
    fn from(error: SqliteStoreError) -> Self {
        match error {
            SqliteStoreError::Io(message) => Self::Io(message),
            SqliteStoreError::Db(message) => Self::Store(message),
            SqliteStoreError::Corrupt(message) => Self::Corrupt(message),
            SqliteStoreError::VersionMismatch(message) => Self::VersionMismatch(message),
            SqliteStoreError::Invalid(message) => Self::Invalid(message),
            SqliteStoreError::Conflict(message) => Self::Conflict(message),
            SqliteStoreError::TooLarge {
                max_bytes,
                actual_bytes,
            } => Self::Invalid(format!(
                "document exceeds size limit: {actual_bytes} bytes (max {max_bytes})"
            )),
        }
    }
}

/// Maps an engine error, singling out constraint violations.
fn db_error(err: &rusqlite::Error, conflict: impl FnOnce() -> String) -> SqliteStoreError {
    match err {
        rusqlite::Error::SqliteFailure(failure, _)
            if failure.code == ErrorCode::ConstraintViolation =>
        {
            SqliteStoreError::Conflict(conflict())
        }
        _ => SqliteStoreError::Db(err.to_string()),
    }
}

// ============================================================================
// SECTION: Store
// ============================================================================

/// `SQLite`-backed lab and audit store with WAL support.
#[derive(Clone)]
pub struct SqliteLabStore {
    /// Shared `SQLite` connection guarded by a mutex.
    connection: Arc<Mutex<Connection>>,
}

impl SqliteLabStore {
    /// Opens an `SQLite`-backed lab store.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError`] when the database cannot be opened or
    /// initialized.
    pub fn new(config: &SqliteStoreConfig) -> Result<Self, SqliteStoreError> {
        validate_store_path(&config.path)?;
        ensure_parent_dir(&config.path)?;
        let mut connection = open_connection(config)?;
        initialize_schema(&mut connection)?;
        Ok(Self {
            connection: Arc::new(Mutex::new(connection)),
        })
    }

    /// Locks the connection.
    fn lock(&self) -> Result<MutexGuard<'_, Connection>, SqliteStoreError> {
        self.connection.lock().map_err(|_| SqliteStoreError::Db("mutex poisoned".to_string()))
    }

    /// Loads one sample by an indexed column.
    fn load_sample(&self, column: SampleColumn, value: &str) -> Result<Option<Sample>, SqliteStoreError> {
        let sql = match column {
            SampleColumn::RecordId => {
                "SELECT body_json, body_hash FROM samples WHERE record_id = ?1"
            }
            SampleColumn::SampleKey => {
                "SELECT body_json, body_hash FROM samples WHERE sample_key = ?1"
            }
        };
        let row = {
            let guard = self.lock()?;
            guard
                .query_row(sql, params![value], read_document_row)
                .optional()
                .map_err(|err| SqliteStoreError::Db(err.to_string()))?
        };
        row.map(|(bytes, hash)| decode_document(&bytes, &hash, "sample")).transpose()
    }

    /// Inserts a sample row.
    fn insert_sample_row(&self, sample: &Sample) -> Result<(), SqliteStoreError> {
        let (bytes, hash) = encode_document(sample)?;
        let guard = self.lock()?;
        guard
            .execute(
                "INSERT INTO samples (record_id, sample_key, sampled_at, created_at, state, \
                 water_type, body_json, body_hash, updated_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6, \
                 ?7, ?8, ?9)",
                params![
                    sample.id.as_str(),
                    sample.sample_id.key(),
                    sample.sampled_at.as_unix_millis(),
                    sample.created_at.as_unix_millis(),
                    sample.state.as_str(),
                    sample.water_type.tipo.to_ascii_lowercase(),
                    bytes,
                    hash,
                    sample.updated_at.as_unix_millis(),
                ],
            )
            .map_err(|err| {
                db_error(&err, || format!("sample {} already exists", sample.sample_id))
            })?;
        Ok(())
    }

    /// Lists samples matching a filter.
    fn list_sample_rows(&self, filter: &SampleFilter) -> Result<Vec<Sample>, SqliteStoreError> {
        let state = filter.state.map(|state| state.as_str().to_string());
        let water_type = filter.water_type.as_ref().map(|kind| kind.to_ascii_lowercase());
        let rows = {
            let guard = self.lock()?;
            let mut statement = guard
                .prepare(
                    "SELECT body_json, body_hash FROM samples WHERE (?1 IS NULL OR state = ?1) \
                     AND (?2 IS NULL OR water_type = ?2) ORDER BY sampled_at DESC, created_at \
                     DESC",
                )
                .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
            let rows = statement
                .query_map(params![state, water_type], read_document_row)
                .map_err(|err| SqliteStoreError::Db(err.to_string()))?
                .collect::<Result<Vec<_>, _>>()
                .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
            rows
        };
        rows.iter().map(|(bytes, hash)| decode_document(bytes, hash, "sample")).collect()
    }

    /// Replaces a sample row.
    fn update_sample_row(&self, sample: &Sample) -> Result<(), SqliteStoreError> {
        let (bytes, hash) = encode_document(sample)?;
        let changed = self
            .lock()?
            .execute(
                "UPDATE samples SET sampled_at = ?3, state = ?4, water_type = ?5, body_json = ?6, \
                 body_hash = ?7, updated_at = ?8 WHERE record_id = ?1 AND sample_key = ?2",
                params![
                    sample.id.as_str(),
                    sample.sample_id.key(),
                    sample.sampled_at.as_unix_millis(),
                    sample.state.as_str(),
                    sample.water_type.tipo.to_ascii_lowercase(),
                    bytes,
                    hash,
                    sample.updated_at.as_unix_millis(),
                ],
            )
            .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
        if changed == 0 {
            return Err(SqliteStoreError::Invalid(format!("sample {} does not exist", sample.id)));
        }
        Ok(())
    }

    /// Deletes a sample row and its result in one transaction.
    fn delete_sample_row(&self, id: &RecordId) -> Result<Option<Sample>, SqliteStoreError> {
        let row = {
            let mut guard = self.lock()?;
            let tx = guard.transaction().map_err(|err| SqliteStoreError::Db(err.to_string()))?;
            let row = tx
                .query_row(
                    "SELECT body_json, body_hash FROM samples WHERE record_id = ?1",
                    params![id.as_str()],
                    read_document_row,
                )
                .optional()
                .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
            if row.is_some() {
                tx.execute(
                    "DELETE FROM results WHERE sample_key = (SELECT sample_key FROM samples WHERE \
                     record_id = ?1)",
                    params![id.as_str()],
                )
                .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
                tx.execute("DELETE FROM samples WHERE record_id = ?1", params![id.as_str()])
                    .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
            }
            tx.commit().map_err(|err| SqliteStoreError::Db(err.to_string()))?;
            drop(guard);
            row
        };
        row.map(|(bytes, hash)| decode_document(&bytes, &hash, "sample")).transpose()
    }

    /// Inserts a result row; the primary key refuses duplicates.
    fn insert_result_row(&self, result: &LabResult) -> Result<(), SqliteStoreError> {
        let (bytes, hash) = encode_document(result)?;
        self.lock()?
            .execute(
                "INSERT INTO results (sample_key, created_at, body_json, body_hash) VALUES (?1, \
                 ?2, ?3, ?4)",
                params![
                    result.sample_id.key(),
                    result.created_at.as_unix_millis(),
                    bytes,
                    hash
                ],
            )
            .map_err(|err| {
                db_error(&err, || format!("result for sample {} already exists", result.sample_id))
            })?;
        Ok(())
    }

    /// Loads a result row.
    fn load_result(&self, sample_id: &SampleId) -> Result<Option<LabResult>, SqliteStoreError> {
        let row = self
            .lock()?
            .query_row(
                "SELECT body_json, body_hash FROM results WHERE sample_key = ?1",
                params![sample_id.key()],
                read_document_row,
            )
            .optional()
            .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
        row.map(|(bytes, hash)| decode_document(&bytes, &hash, "result")).transpose()
    }

    /// Lists every result row.
    fn list_result_rows(&self) -> Result<Vec<LabResult>, SqliteStoreError> {
        let rows = {
            let guard = self.lock()?;
            let mut statement = guard
                .prepare("SELECT body_json, body_hash FROM results ORDER BY created_at DESC")
                .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
            let rows = statement
                .query_map(params![], read_document_row)
                .map_err(|err| SqliteStoreError::Db(err.to_string()))?
                .collect::<Result<Vec<_>, _>>()
                .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
            rows
        };
        rows.iter().map(|(bytes, hash)| decode_document(bytes, hash, "result")).collect()
    }

    /// Replaces a result row.
    fn update_result_row(&self, result: &LabResult) -> Result<(), SqliteStoreError> {
        let (bytes, hash) = encode_document(result)?;
        let changed = self
            .lock()?
            .execute(
                "UPDATE results SET body_json = ?2, body_hash = ?3 WHERE sample_key = ?1",
                params![result.sample_id.key(), bytes, hash],
            )
            .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
        if changed == 0 {
            return Err(SqliteStoreError::Invalid(format!(
                "result for sample {} does not exist",
                result.sample_id
            )));
        }
        Ok(())
    }

    /// Appends an audit row.
    fn append_audit_row(&self, record: &AuditRecord) -> Result<(), SqliteStoreError> {
        let (bytes, hash) = encode_document(record)?;
        self.lock()?
            .execute(
                "INSERT INTO audit_records (record_id, recorded_at, actor_id, actor_document, \
                 actor_name, actor_role, method, route, outcome, status_code, body_json, \
                 body_hash) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
                params![
                    record.id.as_str(),
                    record.fecha.as_unix_millis(),
                    record.usuario.id,
                    record.usuario.documento,
                    record.usuario.nombre,
                    record.usuario.rol,
                    record.accion.tipo,
                    record.accion.ruta,
                    record.estado.as_str(),
                    i64::from(record.status_code),
                    bytes,
                    hash,
                ],
            )
            .map_err(|err| db_error(&err, || format!("audit record {} already exists", record.id)))?;
        Ok(())
    }

    /// Runs an audit query with an optional page window.
    fn query_audit_rows(
        &self,
        query: &AuditQuery,
        paged: bool,
    ) -> Result<(Vec<AuditRecord>, u64), SqliteStoreError> {
        let (where_clause, mut values) = audit_where_clause(query);
        let (rows, total) = {
            let guard = self.lock()?;
            let total: i64 = guard
                .query_row(
                    &format!("SELECT COUNT(*) FROM audit_records{where_clause}"),
                    params_from_iter(values.iter()),
                    |row| row.get(0),
                )
                .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
            let mut sql = format!(
                "SELECT body_json, body_hash FROM audit_records{where_clause} ORDER BY \
                 recorded_at DESC, seq DESC"
            );
            if paged {
                let offset = i64::try_from(query.offset())
                    .map_err(|_| SqliteStoreError::Invalid("page offset too large".to_string()))?;
                sql.push_str(" LIMIT ? OFFSET ?");
                values.push(SqlValue::Integer(i64::from(query.limit)));
                values.push(SqlValue::Integer(offset));
            }
            let mut statement =
                guard.prepare(&sql).map_err(|err| SqliteStoreError::Db(err.to_string()))?;
            let rows = statement
                .query_map(params_from_iter(values.iter()), read_document_row)
                .map_err(|err| SqliteStoreError::Db(err.to_string()))?
                .collect::<Result<Vec<_>, _>>()
                .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
            (rows, total)
        };
        let total = u64::try_from(total)
            .map_err(|_| SqliteStoreError::Corrupt("negative audit record count".to_string()))?;
        let records = rows
            .iter()
            .map(|(bytes, hash)| decode_document(bytes, hash, "audit record"))
            .collect::<Result<Vec<_>, _>>()?;
        Ok((records, total))
    }
}

/// Indexed sample lookup columns.
#[derive(Debug, Clone, Copy)]
enum SampleColumn {
    /// Internal record id.
    RecordId,
    /// Case-folded business key.
    SampleKey,
}

impl LabStore for SqliteLabStore {
    fn insert_sample(&self, sample: &Sample) -> Result<(), StoreError> {
        self.insert_sample_row(sample).map_err(StoreError::from)
    }

    fn sample(&self, id: &RecordId) -> Result<Option<Sample>, StoreError> {
        self.load_sample(SampleColumn::RecordId, id.as_str()).map_err(StoreError::from)
    }

    fn sample_by_key(&self, sample_id: &SampleId) -> Result<Option<Sample>, StoreError> {
        self.load_sample(SampleColumn::SampleKey, &sample_id.key()).map_err(StoreError::from)
    }

    fn list_samples(&self, filter: &SampleFilter) -> Result<Vec<Sample>, StoreError> {
        self.list_sample_rows(filter).map_err(StoreError::from)
    }

    fn update_sample(&self, sample: &Sample) -> Result<(), StoreError> {
        self.update_sample_row(sample).map_err(StoreError::from)
    }

    fn delete_sample(&self, id: &RecordId) -> Result<Option<Sample>, StoreError> {
        self.delete_sample_row(id).map_err(StoreError::from)
    }

    fn insert_result(&self, result: &LabResult) -> Result<(), StoreError> {
        self.insert_result_row(result).map_err(StoreError::from)
    }

    fn result(&self, sample_id: &SampleId) -> Result<Option<LabResult>, StoreError> {
        self.load_result(sample_id).map_err(StoreError::from)
    }

    fn list_results(&self) -> Result<Vec<LabResult>, StoreError> {
        self.list_result_rows().map_err(StoreError::from)
    }

    fn update_result(&self, result: &LabResult) -> Result<(), StoreError> {
        self.update_result_row(result).map_err(StoreError::from)
    }
}

impl AuditStore for SqliteLabStore {
    fn append(&self, record: &AuditRecord) -> Result<(), StoreError> {
        self.append_audit_row(record).map_err(StoreError::from)
    }

    fn query(&self, query: &AuditQuery) -> Result<AuditPage, StoreError> {
        let (records, total) = self.query_audit_rows(query, true)?;
        Ok(AuditPage::new(records, total, query))
    }

    fn export(&self, query: &AuditQuery) -> Result<Vec<AuditRecord>, StoreError> {
        let (records, _) = self.query_audit_rows(query, false)?;
        Ok(records)
    }
}

// ============================================================================
// SECTION: Documents
// ============================================================================

/// Reads a `(body_json, body_hash)` row.
fn read_document_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<(Vec<u8>, String)> {
    Ok((row.get(0)?, row.get(1)?))
}

/// Serializes a document and computes its digest.
fn encode_document<T: Serialize>(value: &T) -> Result<(Vec<u8>, String), SqliteStoreError> {
    let bytes = serde_json::to_vec(value).map_err(|err| SqliteStoreError::Invalid(err.to_string()))?;
    if bytes.len() > MAX_DOCUMENT_BYTES {
        return Err(SqliteStoreError::TooLarge {
            max_bytes: MAX_DOCUMENT_BYTES,
            actual_bytes: bytes.len(),
        });
    }
    let hash = sha256_hex(&bytes);
    Ok((bytes, hash))
}

/// Verifies a stored digest and deserializes the document.
fn decode_document<T: DeserializeOwned>(
    bytes: &[u8],
    hash: &str,
    kind: &str,
) -> Result<T, SqliteStoreError> {
    if bytes.len() > MAX_DOCUMENT_BYTES {
        return Err(SqliteStoreError::TooLarge {
            max_bytes: MAX_DOCUMENT_BYTES,
            actual_bytes: bytes.len(),
        });
    }
    if sha256_hex(bytes) != hash {
        return Err(SqliteStoreError::Corrupt(format!("hash mismatch for stored {kind}")));
    }
    serde_json::from_slice(bytes).map_err(|err| SqliteStoreError::Invalid(err.to_string()))
}

/// Returns the lowercase hex SHA-256 digest of `bytes`.
fn sha256_hex(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    let mut rendered = String::with_capacity(digest.len() * 2);
    for byte in digest {
        let _ = write!(rendered, "{byte:02x}");
    }
    rendered
}

/// Builds the audit `WHERE` clause and its bound values.
fn audit_where_clause(query: &AuditQuery) -> (String, Vec<SqlValue>) {
    let mut conditions: Vec<&str> = Vec::new();
    let mut values = Vec::new();
    if let Some(from) = query.from {
        conditions.push("recorded_at >= ?");
        values.push(SqlValue::Integer(from.as_unix_millis()));
    }
    if let Some(to) = query.to {
        conditions.push("recorded_at <= ?");
        values.push(SqlValue::Integer(to.as_unix_millis()));
    }
    if let Some(user) = &query.user {
        let user = user.to_ascii_lowercase();
        conditions
            .push("(lower(actor_id) = ? OR lower(actor_document) = ? OR lower(actor_name) = ?)");
        values.extend(std::iter::repeat_n(SqlValue::Text(user), 3));
    }
    if let Some(role) = &query.role {
        conditions.push("lower(actor_role) = ?");
        values.push(SqlValue::Text(role.to_ascii_lowercase()));
    }
    if let Some(action) = &query.action {
        conditions.push("(upper(method) = ? OR instr(route, ?) > 0)");
        values.push(SqlValue::Text(action.to_ascii_uppercase()));
        values.push(SqlValue::Text(action.clone()));
    }
    if let Some(outcome) = query.outcome {
        conditions.push("outcome = ?");
        values.push(SqlValue::Text(outcome.as_str().to_string()));
    }
    if conditions.is_empty() {
        return (String::new(), values);
    }
    (format!(" WHERE {}", conditions.join(" AND ")), values)
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Ensures the parent directory for the store exists.
fn ensure_parent_dir(path: &Path) -> Result<(), SqliteStoreError> {
    let Some(parent) = path.parent() else {
        return Err(SqliteStoreError::Io("store path missing parent directory".to_string()));
    };
    if parent.as_os_str().is_empty() {
        return Ok(());
    }
    std::fs::create_dir_all(parent).map_err(|err| SqliteStoreError::Io(err.to_string()))
}

/// Validates store paths for safety limits.
fn validate_store_path(path: &Path) -> Result<(), SqliteStoreError> {
    let path_string = path.display().to_string();
    if path_string.is_empty() {
        return Err(SqliteStoreError::Invalid("store path must not be empty".to_string()));
    }
    if path_string.len() > MAX_TOTAL_PATH_LENGTH {
        return Err(SqliteStoreError::Invalid("store path exceeds length limit".to_string()));
    }
    for component in path.components() {
        let name = component.as_os_str().to_string_lossy();
        if name.len() > MAX_PATH_COMPONENT_LENGTH {
            return Err(SqliteStoreError::Invalid(
                "store path contains an overlong component".to_string(),
            ));
        }
    }
    if path.exists() && path.is_dir() {
        return Err(SqliteStoreError::Invalid(
            "store path must be a file, not a directory".to_string(),
        ));
    }
    Ok(())
}

/// Opens an `SQLite` connection with secure defaults.
fn open_connection(config: &SqliteStoreConfig) -> Result<Connection, SqliteStoreError> {
    let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
        | OpenFlags::SQLITE_OPEN_CREATE
        | OpenFlags::SQLITE_OPEN_FULL_MUTEX;
    let connection = Connection::open_with_flags(&config.path, flags)
        .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
    apply_pragmas(&connection, config)?;
    Ok(connection)
}

/// Applies `SQLite` pragmas required for durability.
fn apply_pragmas(
    connection: &Connection,
    config: &SqliteStoreConfig,
) -> Result<(), SqliteStoreError> {
    connection
        .execute_batch("PRAGMA foreign_keys = ON;")
        .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
    connection
        .execute_batch(&format!("PRAGMA journal_mode = {};", config.journal_mode.pragma_value()))
        .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
    connection
        .execute_batch(&format!("PRAGMA synchronous = {};", config.sync_mode.pragma_value()))
        .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
    connection
        .busy_timeout(std::time::Duration::from_millis(config.busy_timeout_ms))
        .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
    Ok(())
}

/// Initializes the `SQLite` schema or validates existing version.
fn initialize_schema(connection: &mut Connection) -> Result<(), SqliteStoreError> {
    let tx = connection.transaction().map_err(|err| SqliteStoreError::Db(err.to_string()))?;
    tx.execute_batch("CREATE TABLE IF NOT EXISTS store_meta (version INTEGER NOT NULL);")
        .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
    let version: Option<i64> = tx
        .query_row("SELECT version FROM store_meta LIMIT 1", params![], |row| row.get(0))
        .optional()
        .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
    match version {
        None => {
            tx.execute("INSERT INTO store_meta (version) VALUES (?1)", params![SCHEMA_VERSION])
                .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
            tx.execute_batch(
                "CREATE TABLE IF NOT EXISTS samples (
                    record_id TEXT PRIMARY KEY,
                    sample_key TEXT NOT NULL UNIQUE,
                    sampled_at INTEGER NOT NULL,
                    created_at INTEGER NOT NULL,
                    state TEXT NOT NULL,
                    water_type TEXT NOT NULL,
                    body_json BLOB NOT NULL,
                    body_hash TEXT NOT NULL,
                    updated_at INTEGER NOT NULL
                );
                CREATE INDEX IF NOT EXISTS idx_samples_state ON samples (state);
                CREATE INDEX IF NOT EXISTS idx_samples_water_type ON samples (water_type);
                CREATE TABLE IF NOT EXISTS results (
                    sample_key TEXT PRIMARY KEY,
                    created_at INTEGER NOT NULL,
                    body_json BLOB NOT NULL,
                    body_hash TEXT NOT NULL
                );
                CREATE TABLE IF NOT EXISTS audit_records (
                    seq INTEGER PRIMARY KEY AUTOINCREMENT,
                    record_id TEXT NOT NULL UNIQUE,
                    recorded_at INTEGER NOT NULL,
                    actor_id TEXT NOT NULL,
                    actor_document TEXT NOT NULL,
                    actor_name TEXT NOT NULL,
                    actor_role TEXT NOT NULL,
                    method TEXT NOT NULL,
                    route TEXT NOT NULL,
                    outcome TEXT NOT NULL,
                    status_code INTEGER NOT NULL,
                    body_json BLOB NOT NULL,
                    body_hash TEXT NOT NULL
                );
                CREATE INDEX IF NOT EXISTS idx_audit_recorded_at ON audit_records (recorded_at);
                CREATE INDEX IF NOT EXISTS idx_audit_actor_document
                    ON audit_records (actor_document);",
            )
            .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
        }
        Some(value) if value == SCHEMA_VERSION => {}
        Some(value) => {
            return Err(SqliteStoreError::VersionMismatch(format!(
                "unsupported schema version: {value}"
            )));
        }
    }
    tx.commit().map_err(|err| SqliteStoreError::Db(err.to_string()))?;
    Ok(())
}
