// crates/aqualab-api/src/handlers.rs
// ============================================================================
// Module: HTTP Handlers
// Description: Shared router state, authentication middleware, and handlers.
// Purpose: Translate HTTP requests into lifecycle operations.
// Dependencies: aqualab-core, axum, tokio
// ============================================================================

//! ## Overview
//! Every `/api` route passes through [`authenticate`], which resolves the
//! bearer token, enforces the catalog permissions, hands the caller to the
//! handler through request extensions, and publishes the identity on the
//! response for the audit layer. Handlers run store work through
//! [`run_blocking`] so synchronous stores never stall the async workers.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;

use aqualab_core::AuditQueryParams;
use aqualab_core::AuditStore;
use aqualab_core::LabError;
use aqualab_core::NewSample;
use aqualab_core::Permission;
use aqualab_core::ResultInput;
use aqualab_core::ResultLifecycle;
use aqualab_core::Role;
use aqualab_core::SampleId;
use aqualab_core::SampleLifecycle;
use aqualab_core::SampleUpdate;
use aqualab_core::SharedAuditStore;
use aqualab_core::SignatureSubmission;
use aqualab_core::require_permission;
use axum::Extension;
use axum::Json;
use axum::body::Bytes;
use axum::extract::MatchedPath;
use axum::extract::Path;
use axum::extract::Query;
use axum::extract::Request;
use axum::extract::State;
use axum::http::header::AUTHORIZATION;
use axum::middleware::Next;
use axum::response::IntoResponse;
use axum::response::Response;
use serde::Deserialize;
use serde_json::Value;
use serde_json::json;
use tokio::runtime::Handle;
use tokio::runtime::RuntimeFlavor;

use crate::audit::AuditRecorder;
use crate::audit::route_spec;
use crate::auth::Caller;
use crate::auth::IdentityResolver;
use crate::directory::UserDirectory;
use crate::error::ApiError;
use crate::error::created;
use crate::error::ok;
use crate::error::ok_with_message;
use crate::error::parse_json;
use crate::telemetry::EventSink;
use crate::telemetry::ServiceEvent;
use crate::telemetry::now_timestamp;

// ============================================================================
// SECTION: State
// ============================================================================

/// Shared router state.
#[derive(Clone)]
pub struct AppState {
    /// Sample lifecycle manager.
    pub samples: SampleLifecycle,
    /// Result lifecycle manager.
    pub results: ResultLifecycle,
    /// Audit record store.
    pub audit_store: SharedAuditStore,
    /// Bearer token resolver.
    pub resolver: IdentityResolver,
    /// External user directory.
    pub directory: Arc<dyn UserDirectory>,
    /// Background audit recorder.
    pub recorder: AuditRecorder,
    /// Service event sink.
    pub events: Arc<dyn EventSink>,
    /// Maximum accepted request body size.
    pub max_body_bytes: usize,
}

/// Runs synchronous store work without stalling async workers.
fn run_blocking<T>(work: impl FnOnce() -> T) -> T {
    match Handle::try_current() {
        Ok(handle) if handle.runtime_flavor() == RuntimeFlavor::MultiThread => {
            tokio::task::block_in_place(work)
        }
        _ => work(),
    }
}

// ============================================================================
// SECTION: Authentication
// ============================================================================

/// Resolves the caller and enforces the route's catalog permissions.
pub async fn authenticate(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    let header = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string);
    let caller = match state.resolver.resolve(header.as_deref(), now_timestamp()).await {
        Ok(caller) => caller,
        Err(err) => return ApiError::from(err).into_response(),
    };
    let identity = caller.identity.clone();
    let spec = request
        .extensions()
        .get::<MatchedPath>()
        .and_then(|matched| route_spec(request.method(), matched.as_str()));
    let verdict = match spec {
        Some(spec) => spec
            .permissions
            .iter()
            .try_for_each(|permission| require_permission(&identity, *permission))
            .map_err(ApiError::from),
        None => Err(ApiError::Internal("route is missing from the catalog".to_string())),
    };
    let mut response = match verdict {
        Ok(()) => {
            request.extensions_mut().insert(caller);
            next.run(request).await
        }
        Err(err) => err.into_response(),
    };
    response.extensions_mut().insert(identity);
    response
}

// ============================================================================
// SECTION: Service
// ============================================================================

/// Service banner.
pub async fn banner() -> Json<Value> {
    Json(json!({
        "success": true,
        "message": "AquaLab API",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// Unknown route.
pub async fn not_found() -> ApiError {
    ApiError::NotFound("route not found".to_string())
}

// ============================================================================
// SECTION: Samples
// ============================================================================

/// `GET /api/muestras`
pub async fn list_samples(State(state): State<AppState>) -> Result<Response, ApiError> {
    let samples = run_blocking(|| state.samples.list())?;
    ok(&samples)
}

/// `GET /api/muestras/tipo/{tipo}`
pub async fn samples_by_water_type(
    State(state): State<AppState>,
    Path(water_type): Path<String>,
) -> Result<Response, ApiError> {
    let samples = run_blocking(|| state.samples.list_by_water_type(&water_type))?;
    ok(&samples)
}

/// `GET /api/muestras/estado/{estado}`
pub async fn samples_by_state(
    State(state): State<AppState>,
    Path(raw_state): Path<String>,
) -> Result<Response, ApiError> {
    let samples = run_blocking(|| state.samples.list_by_state(&raw_state))?;
    ok(&samples)
}

/// `GET /api/muestras/{id}`
pub async fn get_sample(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    let sample = run_blocking(|| state.samples.get(&id))?;
    ok(&sample)
}

/// `POST /api/muestras`
///
/// The caller and the client are both confirmed against the user directory
/// before the sample is registered.
pub async fn create_sample(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    body: Bytes,
) -> Result<Response, ApiError> {
    let request: NewSample = parse_json(&body)?;
    let administrator = if caller.identity.role == Role::Administrador {
        state.directory.find_by_document(&caller.identity.document, &caller.token).await?
    } else {
        None
    };
    let client_document = request.client_document.trim().to_string();
    let client = if client_document.is_empty() {
        None
    } else {
        state.directory.find_by_document(&client_document, &caller.token).await?
    };
    let sample = run_blocking(|| {
        state.samples.create(
            request,
            &caller.identity,
            administrator.as_ref(),
            client.as_ref(),
            now_timestamp(),
        )
    })?;
    created("sample registered", &sample)
}

/// `PUT /api/muestras/{id}`
pub async fn update_sample(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path(id): Path<String>,
    body: Bytes,
) -> Result<Response, ApiError> {
    let patch: SampleUpdate = parse_json(&body)?;
    let sample =
        run_blocking(|| state.samples.update(&id, &patch, &caller.identity, now_timestamp()))?;
    ok_with_message("sample updated", &sample)
}

/// `DELETE /api/muestras/{id}`
pub async fn delete_sample(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    let sample = run_blocking(|| state.samples.delete(&id))?;
    ok_with_message("sample deleted", &sample)
}

/// `POST /api/muestras/{id}/firma`
pub async fn register_signature(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path(id): Path<String>,
    body: Bytes,
) -> Result<Response, ApiError> {
    let submission: SignatureSubmission = parse_json(&body)?;
    let sample = run_blocking(|| {
        state.samples.register_signature(
            &SampleId::new(&id),
            &submission,
            &caller.identity,
            now_timestamp(),
        )
    })?;
    ok_with_message("signature registered", &sample)
}

// ============================================================================
// SECTION: Results
// ============================================================================

/// `GET /api/resultados/resultados`
pub async fn list_results(State(state): State<AppState>) -> Result<Response, ApiError> {
    let results = run_blocking(|| state.results.list())?;
    ok(&results)
}

/// `GET /api/resultados/muestra/{idMuestra}`
pub async fn get_result(
    State(state): State<AppState>,
    Path(sample_id): Path<String>,
) -> Result<Response, ApiError> {
    let result = run_blocking(|| state.results.get(&SampleId::new(&sample_id)))?;
    ok(&result)
}

/// `POST /api/resultados/registrar/{idMuestra}`
pub async fn register_result(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path(sample_id): Path<String>,
    body: Bytes,
) -> Result<Response, ApiError> {
    let input: ResultInput = parse_json(&body)?;
    let transition = run_blocking(|| {
        state.results.register(
            &SampleId::new(&sample_id),
            &input,
            &caller.identity,
            now_timestamp(),
        )
    })?;
    created("results registered", &transition.result)
}

/// `PUT /api/resultados/editar/{idMuestra}`
pub async fn edit_result(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path(sample_id): Path<String>,
    body: Bytes,
) -> Result<Response, ApiError> {
    let input: ResultInput = parse_json(&body)?;
    let result = run_blocking(|| {
        state.results.edit(&SampleId::new(&sample_id), &input, &caller.identity, now_timestamp())
    })?;
    ok_with_message("results updated", &result)
}

/// `POST /api/resultados/verificar/{idMuestra}`
pub async fn verify_result(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path(sample_id): Path<String>,
) -> Result<Response, ApiError> {
    let transition = run_blocking(|| {
        state.results.verify(&SampleId::new(&sample_id), &caller.identity, now_timestamp())
    })?;
    ok_with_message("results verified", &transition.result)
}

// ============================================================================
// SECTION: Audit
// ============================================================================

/// `GET /api/auditoria/registros`
///
/// Filtering additionally requires `filtrar_auditoria`.
pub async fn audit_records(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Query(params): Query<AuditQueryParams>,
) -> Result<Response, ApiError> {
    if params.has_filters() {
        require_permission(&caller.identity, Permission::FiltrarAuditoria)?;
    }
    let query = params.into_query()?;
    let page = run_blocking(|| state.audit_store.query(&query)).map_err(LabError::from)?;
    ok(&page)
}

/// `GET /api/auditoria/exportar`
///
/// Applies the same filters as the listing but returns every match.
pub async fn export_audit(
    State(state): State<AppState>,
    Query(params): Query<AuditQueryParams>,
) -> Result<Response, ApiError> {
    let query = params.into_query()?;
    let records = run_blocking(|| state.audit_store.export(&query)).map_err(LabError::from)?;
    ok(&records)
}

// ============================================================================
// SECTION: Users
// ============================================================================

/// Query for `validar-usuario`.
#[derive(Debug, Deserialize)]
pub struct ValidateUserQuery {
    /// Document number to look up.
    #[serde(default)]
    documento: Option<String>,
}

/// `GET /api/registro-muestras/validar-usuario?documento=`
pub async fn validate_user(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Query(query): Query<ValidateUserQuery>,
) -> Result<Response, ApiError> {
    let document = query
        .documento
        .map(|document| document.trim().to_string())
        .filter(|document| !document.is_empty())
        .ok_or_else(|| ApiError::Validation("documento is required".to_string()))?;
    let user = state
        .directory
        .find_by_document(&document, &caller.token)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("user {document} not found")))?;
    ok_with_message("user validated", &user)
}

/// `POST /api/auth/revocar`
///
/// Local revocation always applies; a directory failure is only logged.
pub async fn revoke_token(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
) -> Result<Response, ApiError> {
    state.resolver.revoke(&caller.token);
    if let Err(err) = state.directory.revoke_token(&caller.token).await {
        state.events.record(
            &ServiceEvent::warn("directory_revoke_failed")
                .with("user_id", caller.identity.user_id.as_str())
                .with("error", err.to_string()),
        );
    }
    ok_with_message("token revoked", &Value::Null)
}
