// crates/aqualab-api/tests/common/mod.rs
// ============================================================================
// Module: API Test Harness
// Description: Token builders, directory fixtures, and a oneshot client.
// Purpose: Drive the full router in-process without binding sockets.
// Dependencies: aqualab-api, aqualab-core, axum, base64, tower, http-body-util
// ============================================================================

#![allow(dead_code, reason = "Each test binary uses a different subset of helpers.")]
#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::missing_panics_doc,
    reason = "Test-only harness may unwrap."
)]

use std::sync::Arc;
use std::time::SystemTime;
use std::time::UNIX_EPOCH;

use aqualab_api::AppState;
use aqualab_api::LabComponents;
use aqualab_api::StaticUserDirectory;
use aqualab_api::build_router;
use aqualab_core::DirectoryUser;
use aqualab_core::Role;
use axum::Router;
use axum::body::Body;
use axum::http::Request;
use axum::http::StatusCode;
use axum::http::header::AUTHORIZATION;
use axum::http::header::CONTENT_TYPE;
use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use http_body_util::BodyExt;
use serde_json::Value;
use serde_json::json;
use tower::ServiceExt;

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

/// Router under test plus handles to its collaborators.
pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    pub directory: Arc<StaticUserDirectory>,
}

impl TestApp {
    pub fn new() -> Self {
        Self::with_directory(StaticUserDirectory::new(directory_users()))
    }

    pub fn with_directory(directory: StaticUserDirectory) -> Self {
        Self::build(Arc::new(directory), None)
    }

    pub fn with_body_limit(max_body_bytes: usize) -> Self {
        Self::build(Arc::new(StaticUserDirectory::new(directory_users())), Some(max_body_bytes))
    }

    fn build(directory: Arc<StaticUserDirectory>, max_body_bytes: Option<usize>) -> Self {
        let mut components = LabComponents::in_memory(directory.clone());
        if let Some(limit) = max_body_bytes {
            components.max_body_bytes = limit;
        }
        Self::from_components(components, directory)
    }

    /// Wraps caller-assembled components; `directory` must be the one inside them.
    pub fn from_components(
        components: LabComponents,
        directory: Arc<StaticUserDirectory>,
    ) -> Self {
        let state = components.into_state();
        Self {
            router: build_router(state.clone()),
            state,
            directory,
        }
    }

    pub async fn send(
        &self,
        method: &str,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(AUTHORIZATION, format!("Bearer {token}"));
        }
        let request = match body {
            Some(body) => builder
                .header(CONTENT_TYPE, "application/json")
                .body(Body::from(serde_json::to_vec(&body).unwrap()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, value)
    }

    pub async fn flush_audit(&self) {
        self.state.recorder.flush().await;
    }
}

fn user(id: &str, document: &str, name: &str, role: Role) -> DirectoryUser {
    DirectoryUser {
        id: id.to_string(),
        document: document.to_string(),
        name: Some(name.to_string()),
        email: None,
        role,
    }
}

pub fn directory_users() -> Vec<DirectoryUser> {
    vec![
        user("u-admin", ADMIN_DOC, "Ana Ruiz", Role::Administrador),
        user("u-client", CLIENT_DOC, "Carlos Paz", Role::Cliente),
        user("u-t1", T1_DOC, "Tecnico Uno", Role::Laboratorista),
        user("u-t2", T2_DOC, "Tecnico Dos", Role::Laboratorista),
    ]
}

fn now_secs() -> i64 {
    i64::try_from(SystemTime::now().duration_since(UNIX_EPOCH).unwrap().as_secs()).unwrap()
}

/// Builds an unsigned JWT around `claims`.
pub fn token(claims: &Value) -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
    let payload = URL_SAFE_NO_PAD.encode(serde_json::to_vec(claims).unwrap());
    format!("{header}.{payload}.c2lnbmF0dXJl")
}

fn token_for(id: &str, document: &str, name: &str, role: &str) -> String {
    token(&json!({
        "userId": id,
        "documento": document,
        "nombre": name,
        "rol": role,
        "exp": now_secs() + 3600
    }))
}

pub fn admin_token() -> String {
    token_for("u-admin", ADMIN_DOC, "Ana Ruiz", "administrador")
}

pub fn client_token() -> String {
    token(&json!({
        "userId": "u-client",
        "documento": CLIENT_DOC,
        "rol": {"name": "Cliente"},
        "exp": now_secs() + 3600
    }))
}

pub fn t1_token() -> String {
    token_for("u-t1", T1_DOC, "Tecnico Uno", "laboratorista")
}

pub fn t2_token() -> String {
    token_for("u-t2", T2_DOC, "Tecnico Dos", "laboratorista")
}

pub fn expired_token() -> String {
    token(&json!({
        "userId": "u-admin",
        "documento": ADMIN_DOC,
        "rol": "administrador",
        "exp": now_secs() - 60
    }))
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
