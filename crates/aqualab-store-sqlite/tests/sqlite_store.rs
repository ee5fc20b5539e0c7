// crates/aqualab-store-sqlite/tests/sqlite_store.rs
// ============================================================================
// Module: SQLite Lab Store Tests
// Description: Persistence, integrity, and query parity for the SQLite store.
// Purpose: Validate path safety, schema versioning, hash verification, result
//          uniqueness, and audit filtering against the in-memory reference.
// Dependencies: aqualab-core, aqualab-store-sqlite, rusqlite, tempfile
// ============================================================================

//! ## Overview
//! Exercises the `SQLite` backend through the lifecycle managers and through
//! the raw store traits:
//! - Path safety checks and schema version validation
//! - Persistence across reopen
//! - Hash mismatch detection on load
//! - Database-enforced result uniqueness
//! - Audit query parity with the in-memory store

#![allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    reason = "Test-only assertions and helpers are permitted."
)]

use std::path::Path;

use aqualab_core::AuditAction;
use aqualab_core::AuditActor;
use aqualab_core::AuditDetails;
use aqualab_core::AuditOutcome;
use aqualab_core::AuditQuery;
use aqualab_core::AuditRecord;
use aqualab_core::AuditStore;
use aqualab_core::DirectoryUser;
use aqualab_core::Identity;
use aqualab_core::InMemoryAuditStore;
use aqualab_core::LabError;
use aqualab_core::LabStore;
use aqualab_core::NewSample;
use aqualab_core::Permission;
use aqualab_core::RecordId;
use aqualab_core::ResultInput;
use aqualab_core::ResultLifecycle;
use aqualab_core::Role;
use aqualab_core::SampleFilter;
use aqualab_core::SampleId;
use aqualab_core::SampleLifecycle;
use aqualab_core::SampleState;
use aqualab_core::SharedLabStore;
use aqualab_core::StoreError;
use aqualab_core::Timestamp;
use aqualab_store_sqlite::SqliteLabStore;
use aqualab_store_sqlite::SqliteStoreConfig;
use aqualab_store_sqlite::SqliteStoreError;
use rusqlite::Connection;
use rusqlite::params;
use serde_json::json;
use tempfile::TempDir;

// ============================================================================
// SECTION: Helpers
// ============================================================================

const SIGNATURE: &str = "data:image/png;base64,iVBORw0KGgo=";

fn at(seconds: i64) -> Timestamp {
    Timestamp::from_unix_millis(1_709_280_000_000 + seconds * 1000)
}

fn store_for(path: &Path) -> SqliteLabStore {
    SqliteLabStore::new(&SqliteStoreConfig::at_path(path)).unwrap()
}

fn admin() -> Identity {
    Identity::with_role_permissions("u-admin", "1001", Role::Administrador).named("Ana Ruiz")
}

fn technician(document: &str) -> Identity {
    Identity::with_role_permissions(format!("u-{document}"), document, Role::Laboratorista)
}

fn directory_user(id: &str, document: &str, role: Role) -> DirectoryUser {
    DirectoryUser {
        id: id.to_string(),
        document: document.to_string(),
        name: None,
        email: None,
        role,
    }
}

fn new_sample(sample_id: &str, water_type: &str, hour: u8) -> NewSample {
    serde_json::from_value(json!({
        "idMuestra": sample_id,
        "documento": "2002",
        "fechaHora": format!("2024-03-01T{hour:02}:00:00Z"),
        "tipoDeAgua": {"tipo": water_type},
        "tipoMuestreo": "simple",
        "firmas": {
            "firmaAdministrador": {"firma": SIGNATURE},
            "firmaCliente": {"firma": SIGNATURE}
        }
    }))
    .unwrap()
}

fn seed(samples: &SampleLifecycle, sample_id: &str, water_type: &str, hour: u8) {
    samples
        .create(
            new_sample(sample_id, water_type, hour),
            &admin(),
            Some(&directory_user("u-admin", "1001", Role::Administrador)),
            Some(&directory_user("u-client", "2002", Role::Cliente)),
            at(i64::from(hour)),
        )
        .unwrap();
}

fn audit_record(millis: i64, document: &str, role: &str, method: &str, route: &str, status: u16) -> AuditRecord {
    let fecha = Timestamp::from_unix_millis(millis);
    AuditRecord {
        id: RecordId::generate(fecha),
        usuario: AuditActor {
            id: format!("u-{document}"),
            nombre: format!("User {document}"),
            rol: role.to_string(),
            documento: document.to_string(),
            permisos: Vec::new(),
        },
        accion: AuditAction {
            tipo: method.to_string(),
            ruta: route.to_string(),
            descripcion: format!("{method} {route}"),
            required_permissions: vec![Permission::VerMuestras],
        },
        detalles: AuditDetails::default(),
        estado: AuditOutcome::from_status(status),
        status_code: status,
        mensaje: json!({"success": status < 400}),
        fecha,
    }
}

// ============================================================================
// SECTION: Path and Schema
// ============================================================================

#[test]
fn sqlite_store_rejects_directory_path() {
    let temp = TempDir::new().unwrap();
    let result = SqliteLabStore::new(&SqliteStoreConfig::at_path(temp.path()));
    assert!(matches!(result, Err(SqliteStoreError::Invalid(_))));
}

#[test]
fn sqlite_store_rejects_overlong_component() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("a".repeat(300)).join("lab.sqlite");
    let result = SqliteLabStore::new(&SqliteStoreConfig::at_path(path));
    assert!(matches!(result, Err(SqliteStoreError::Invalid(_))));
}

#[test]
fn sqlite_store_creates_parent_directories() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("nested").join("lab.sqlite");
    let _store = store_for(&path);
    assert!(path.exists());
}

#[test]
fn sqlite_store_rejects_unknown_schema_version() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("lab.sqlite");
    drop(store_for(&path));
    let connection = Connection::open(&path).unwrap();
    connection.execute("UPDATE store_meta SET version = 99", params![]).unwrap();
    drop(connection);
    let result = SqliteLabStore::new(&SqliteStoreConfig::at_path(&path));
    assert!(matches!(result, Err(SqliteStoreError::VersionMismatch(_))));
}

// ============================================================================
// SECTION: Samples and Results
// ============================================================================

#[test]
fn sqlite_store_persists_lifecycle_across_reopen() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("lab.sqlite");
    {
        let shared = SharedLabStore::from_store(store_for(&path));
        let samples = SampleLifecycle::new(shared.clone());
        let results = ResultLifecycle::new(shared);
        seed(&samples, "M-001", "Potable", 8);
        let input: ResultInput = serde_json::from_value(json!({"pH": {"valor": 7.1}})).unwrap();
        results.register(&SampleId::new("M-001"), &input, &technician("3003"), at(20)).unwrap();
    }
    let shared = SharedLabStore::from_store(store_for(&path));
    let samples = SampleLifecycle::new(shared.clone());
    let results = ResultLifecycle::new(shared);
    let sample = samples.get("m-001").unwrap();
    assert_eq!(sample.state, SampleState::EnAnalisis);
    assert_eq!(sample.history.len(), 2);
    let transition = results.verify(&SampleId::new("M-001"), &technician("3004"), at(30)).unwrap();
    assert!(transition.result.verificado);
    assert_eq!(transition.sample.state, SampleState::Verificada);
    assert_eq!(samples.get("M-001").unwrap().state, SampleState::Verificada);
}

#[test]
fn sqlite_store_rejects_duplicate_business_key() {
    let temp = TempDir::new().unwrap();
    let samples = SampleLifecycle::new(SharedLabStore::from_store(store_for(&temp.path().join("lab.sqlite"))));
    seed(&samples, "M-001", "potable", 8);
    let err = samples
        .create(
            new_sample("m-001", "potable", 9),
            &admin(),
            Some(&directory_user("u-admin", "1001", Role::Administrador)),
            Some(&directory_user("u-client", "2002", Role::Cliente)),
            at(9),
        )
        .unwrap_err();
    assert!(matches!(err, LabError::Validation(_)));
}

#[test]
fn sqlite_store_refuses_second_result_for_sample() {
    let temp = TempDir::new().unwrap();
    let store = store_for(&temp.path().join("lab.sqlite"));
    let shared = SharedLabStore::from_store(store.clone());
    let samples = SampleLifecycle::new(shared.clone());
    let results = ResultLifecycle::new(shared);
    seed(&samples, "M-001", "potable", 8);
    let input: ResultInput = serde_json::from_value(json!({"turbidez": {"valor": 0}})).unwrap();
    let transition =
        results.register(&SampleId::new("M-001"), &input, &technician("3003"), at(20)).unwrap();
    let err = store.insert_result(&transition.result).unwrap_err();
    assert!(matches!(err, StoreError::Conflict(_)));
}

#[test]
fn sqlite_store_filters_samples_by_state_and_water_type() {
    let temp = TempDir::new().unwrap();
    let store = store_for(&temp.path().join("lab.sqlite"));
    let samples = SampleLifecycle::new(SharedLabStore::from_store(store.clone()));
    seed(&samples, "M-001", "Potable", 8);
    seed(&samples, "M-002", "residual", 10);
    seed(&samples, "M-003", "potable", 9);

    let all = store.list_samples(&SampleFilter::default()).unwrap();
    let ids: Vec<_> = all.iter().map(|sample| sample.sample_id.as_str().to_string()).collect();
    assert_eq!(ids, vec!["M-002", "M-003", "M-001"]);

    let potable = samples.list_by_water_type("POTABLE").unwrap();
    assert_eq!(potable.len(), 2);
    let received = samples.list_by_state("Recibida").unwrap();
    assert_eq!(received.len(), 3);
    assert!(samples.list_by_state("Verificada").unwrap().is_empty());
}

#[test]
fn sqlite_store_delete_returns_removed_sample() {
    let temp = TempDir::new().unwrap();
    let store = store_for(&temp.path().join("lab.sqlite"));
    let samples = SampleLifecycle::new(SharedLabStore::from_store(store.clone()));
    seed(&samples, "M-001", "potable", 8);
    let sample = samples.get("M-001").unwrap();
    let removed = store.delete_sample(&sample.id).unwrap().unwrap();
    assert_eq!(removed.sample_id.as_str(), "M-001");
    assert!(store.delete_sample(&sample.id).unwrap().is_none());
    assert!(store.sample_by_key(&SampleId::new("M-001")).unwrap().is_none());
}

#[test]
fn sqlite_store_delete_drops_the_result_with_the_sample() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("lab.sqlite");
    let key = SampleId::new("M-001");
    let input: ResultInput = serde_json::from_value(json!({"pH": {"valor": 7}})).unwrap();
    {
        let store = store_for(&path);
        let shared = SharedLabStore::from_store(store.clone());
        let samples = SampleLifecycle::new(shared.clone());
        let results = ResultLifecycle::new(shared);
        seed(&samples, "M-001", "potable", 8);
        results.register(&key, &input, &technician("3003"), at(20)).unwrap();
        let sample = samples.get("M-001").unwrap();
        store.delete_sample(&sample.id).unwrap().unwrap();
        assert!(store.result(&key).unwrap().is_none());
    }

    let store = store_for(&path);
    assert!(store.list_results().unwrap().is_empty());
    let shared = SharedLabStore::from_store(store);
    let samples = SampleLifecycle::new(shared.clone());
    let results = ResultLifecycle::new(shared);
    seed(&samples, "M-001", "potable", 9);
    let transition = results.register(&key, &input, &technician("3003"), at(30)).unwrap();
    assert_eq!(transition.sample.state, SampleState::EnAnalisis);
}

#[test]
fn sqlite_store_detects_hash_mismatch() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("lab.sqlite");
    let store = store_for(&path);
    let samples = SampleLifecycle::new(SharedLabStore::from_store(store.clone()));
    seed(&samples, "M-001", "potable", 8);
    let connection = Connection::open(&path).unwrap();
    connection
        .execute("UPDATE samples SET body_hash = 'bad' WHERE sample_key = ?1", params!["m-001"])
        .unwrap();
    let err = store.sample_by_key(&SampleId::new("M-001")).unwrap_err();
    assert!(matches!(err, StoreError::Corrupt(_)));
}

#[test]
fn sqlite_store_update_of_missing_sample_is_invalid() {
    let temp = TempDir::new().unwrap();
    let store = store_for(&temp.path().join("lab.sqlite"));
    let samples = SampleLifecycle::new(SharedLabStore::from_store(store.clone()));
    seed(&samples, "M-001", "potable", 8);
    let mut sample = samples.get("M-001").unwrap();
    store.delete_sample(&sample.id).unwrap();
    sample.client_document = "9999".to_string();
    assert!(matches!(store.update_sample(&sample), Err(StoreError::Invalid(_))));
}

// ============================================================================
// SECTION: Audit
// ============================================================================

#[test]
fn sqlite_audit_query_matches_in_memory_reference() {
    let temp = TempDir::new().unwrap();
    let sqlite = store_for(&temp.path().join("lab.sqlite"));
    let memory = InMemoryAuditStore::new();
    let records = vec![
        audit_record(1_000, "1001", "administrador", "POST", "/api/muestras", 201),
        audit_record(2_000, "3003", "laboratorista", "POST", "/api/resultados/registrar/M-1", 400),
        audit_record(3_000, "3003", "laboratorista", "GET", "/api/resultados/resultados", 200),
        audit_record(4_000, "2002", "cliente", "GET", "/api/muestras", 403),
        audit_record(5_000, "3004", "laboratorista", "PUT", "/api/resultados/verificar/M-1", 200),
    ];
    for record in &records {
        sqlite.append(record).unwrap();
        memory.append(record).unwrap();
    }

    let queries = vec![
        AuditQuery::default(),
        AuditQuery {
            user: Some("U-3003".to_string()),
            ..AuditQuery::default()
        },
        AuditQuery {
            role: Some("Laboratorista".to_string()),
            page: 2,
            limit: 2,
            ..AuditQuery::default()
        },
        AuditQuery {
            action: Some("post".to_string()),
            ..AuditQuery::default()
        },
        AuditQuery {
            action: Some("resultados".to_string()),
            outcome: Some(AuditOutcome::Exitoso),
            ..AuditQuery::default()
        },
        AuditQuery {
            from: Some(Timestamp::from_unix_millis(2_000)),
            to: Some(Timestamp::from_unix_millis(4_000)),
            ..AuditQuery::default()
        },
    ];
    for query in &queries {
        let left = sqlite.query(query).unwrap();
        let right = memory.query(query).unwrap();
        assert_eq!(left.total, right.total, "total for {query:?}");
        assert_eq!(left.total_pages, right.total_pages);
        let left_ids: Vec<_> = left.registros.iter().map(|record| record.id.clone()).collect();
        let right_ids: Vec<_> = right.registros.iter().map(|record| record.id.clone()).collect();
        assert_eq!(left_ids, right_ids, "records for {query:?}");
    }
}

#[test]
fn sqlite_audit_export_ignores_pagination() {
    let temp = TempDir::new().unwrap();
    let sqlite = store_for(&temp.path().join("lab.sqlite"));
    for index in 0 .. 15 {
        sqlite
            .append(&audit_record(index * 1_000, "1001", "administrador", "GET", "/api/auditoria/registros", 200))
            .unwrap();
    }
    let query = AuditQuery::default();
    assert_eq!(sqlite.query(&query).unwrap().registros.len(), 10);
    let exported = sqlite.export(&query).unwrap();
    assert_eq!(exported.len(), 15);
    assert_eq!(exported[0].fecha, Timestamp::from_unix_millis(14_000));
}
