// crates/aqualab-core/tests/common/mod.rs
// ============================================================================
// Module: Core Test Fixtures
// Description: Shared identities, directory records, and sample payloads.
// Purpose: Keep lifecycle tests focused on the behavior under test.
// Dependencies: aqualab-core, serde_json
// ============================================================================

#![allow(dead_code, reason = "Each test binary uses a different subset of fixtures.")]
#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    reason = "Test-only fixtures may unwrap."
)]

use aqualab_core::DirectoryUser;
use aqualab_core::Identity;
use aqualab_core::InMemoryLabStore;
use aqualab_core::NewSample;
use aqualab_core::ResultInput;
use aqualab_core::Role;
use aqualab_core::Sample;
use aqualab_core::SampleLifecycle;
use aqualab_core::SharedLabStore;
use aqualab_core::Timestamp;
use serde_json::Value;
use serde_json::json;

/// Small valid PNG-prefixed signature.
pub const SIGNATURE: &str = "data:image/png;base64,iVBORw0KGgo=";
/// Administrator document.
pub const ADMIN_DOC: &str = "1001";
/// Client document.
pub const CLIENT_DOC: &str = "2002";
/// First technician document.
pub const T1_DOC: &str = "3003";
/// Second technician document.
pub const T2_DOC: &str = "3004";

pub fn at(seconds: i64) -> Timestamp {
    Timestamp::from_unix_millis(1_709_280_000_000 + seconds * 1000)
}

pub fn admin() -> Identity {
    Identity::with_role_permissions("u-admin", ADMIN_DOC, Role::Administrador).named("Ana Ruiz")
}

pub fn client() -> Identity {
    Identity::with_role_permissions("u-client", CLIENT_DOC, Role::Cliente).named("Carlos Paz")
}

pub fn technician(document: &str) -> Identity {
    Identity::with_role_permissions(format!("u-{document}"), document, Role::Laboratorista)
        .named(format!("Tecnico {document}"))
}

pub fn admin_record() -> DirectoryUser {
    DirectoryUser {
        id: "u-admin".to_string(),
        document: ADMIN_DOC.to_string(),
        name: Some("Ana Ruiz".to_string()),
        email: None,
        role: Role::Administrador,
    }
}

pub fn client_record() -> DirectoryUser {
    DirectoryUser {
        id: "u-client".to_string(),
        document: CLIENT_DOC.to_string(),
        name: Some("Carlos Paz".to_string()),
        email: Some("carlos@example.com".to_string()),
        role: Role::Cliente,
    }
}

pub fn sample_body(sample_id: &str) -> Value {
    json!({
        "idMuestra": sample_id,
        "documento": CLIENT_DOC,
        "fechaHora": "2024-03-01T08:00:00Z",
        "tipoDeAgua": {"tipo": "potable", "descripcion": "red municipal"},
        "tipoMuestreo": "simple",
        "lugarMuestreo": "Planta norte",
        "firmas": {
            "firmaAdministrador": {"firma": SIGNATURE},
            "firmaCliente": {"firma": SIGNATURE}
        }
    })
}

pub fn new_sample(sample_id: &str) -> NewSample {
    serde_json::from_value(sample_body(sample_id)).unwrap()
}

pub fn result_input(body: Value) -> ResultInput {
    serde_json::from_value(body).unwrap()
}

pub fn store() -> SharedLabStore {
    SharedLabStore::from_store(InMemoryLabStore::new())
}

pub fn seed_sample(samples: &SampleLifecycle, sample_id: &str, now: Timestamp) -> Sample {
    samples
        .create(new_sample(sample_id), &admin(), Some(&admin_record()), Some(&client_record()), now)
        .unwrap()
}
