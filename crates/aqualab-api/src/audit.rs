// crates/aqualab-api/src/audit.rs
// ============================================================================
// Module: Audit Pipeline
// Description: Route catalog, audit middleware, and the background recorder.
// Purpose: Record every request and its outcome without blocking responses.
// Dependencies: aqualab-core, axum, serde_json, tokio
// ============================================================================

//! ## Overview
//! [`ROUTES`] is the single catalog of authenticated routes: the auth layer
//! reads the required permissions from it and the audit layer copies them
//! into each record. [`audit_request`] wraps every route, including the
//! fallback, buffers both bodies, and hands an [`AuditRecord`] to the
//! [`AuditRecorder`]. The recorder is a bounded queue drained by one worker
//! task that persists records on the blocking pool; a full queue or a
//! persistence failure is logged and the record dropped.
//! Security posture: request bodies are bounded before buffering.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::net::SocketAddr;
use std::sync::Arc;

use aqualab_core::AuditAction;
use aqualab_core::AuditActor;
use aqualab_core::AuditDetails;
use aqualab_core::AuditOutcome;
use aqualab_core::AuditRecord;
use aqualab_core::AuditStore;
use aqualab_core::Identity;
use aqualab_core::Permission;
use aqualab_core::RecordId;
use aqualab_core::SharedAuditStore;
use axum::RequestPartsExt;
use axum::body::Body;
use axum::body::Bytes;
use axum::extract::ConnectInfo;
use axum::extract::MatchedPath;
use axum::extract::RawPathParams;
use axum::extract::Request;
use axum::extract::State;
use axum::http::Method;
use axum::http::header::USER_AGENT;
use axum::http::request::Parts;
use axum::middleware::Next;
use axum::response::IntoResponse;
use axum::response::Response;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::oneshot;

use crate::error::ApiError;
use crate::error::InternalErrorDetail;
use crate::handlers::AppState;
use crate::telemetry::EventSink;
use crate::telemetry::ServiceEvent;
use crate::telemetry::now_timestamp;

// ============================================================================
// SECTION: Route Catalog
// ============================================================================

/// Authenticated route descriptor.
#[derive(Debug, Clone, Copy)]
pub struct RouteSpec {
    /// HTTP method.
    pub method: &'static str,
    /// Router path template.
    pub template: &'static str,
    /// Permissions required to call the route.
    pub permissions: &'static [Permission],
    /// Path parameter carrying a sample business key.
    pub sample_param: Option<&'static str>,
}

/// Catalog of every authenticated route.
pub static ROUTES: &[RouteSpec] = &[
    RouteSpec {
        method: "GET",
        template: "/api/muestras",
        permissions: &[Permission::VerMuestras],
        sample_param: None,
    },
    RouteSpec {
        method: "POST",
        template: "/api/muestras",
        permissions: &[Permission::RegistrarMuestra],
        sample_param: None,
    },
    RouteSpec {
        method: "GET",
        template: "/api/muestras/tipo/{tipo}",
        permissions: &[Permission::VerMuestras],
        sample_param: None,
    },
    RouteSpec {
        method: "GET",
        template: "/api/muestras/estado/{estado}",
        permissions: &[Permission::VerMuestras],
        sample_param: None,
    },
    RouteSpec {
        method: "GET",
        template: "/api/muestras/{id}",
        permissions: &[Permission::VerMuestras],
        sample_param: None,
    },
    RouteSpec {
        method: "PUT",
        template: "/api/muestras/{id}",
        permissions: &[Permission::EditarMuestra],
        sample_param: None,
    },
    RouteSpec {
        method: "DELETE",
        template: "/api/muestras/{id}",
        permissions: &[Permission::EliminarMuestra],
        sample_param: None,
    },
    RouteSpec {
        method: "POST",
        template: "/api/muestras/{id}/firma",
        permissions: &[Permission::RegistrarMuestra],
        sample_param: Some("id"),
    },
    RouteSpec {
        method: "GET",
        template: "/api/resultados/resultados",
        permissions: &[Permission::VerResultados],
        sample_param: None,
    },
    RouteSpec {
        method: "GET",
        template: "/api/resultados/muestra/{idMuestra}",
        permissions: &[Permission::VerResultados],
        sample_param: Some("idMuestra"),
    },
    RouteSpec {
        method: "POST",
        template: "/api/resultados/registrar/{idMuestra}",
        permissions: &[Permission::RegistrarResultados],
        sample_param: Some("idMuestra"),
    },
    RouteSpec {
        method: "PUT",
        template: "/api/resultados/editar/{idMuestra}",
        permissions: &[Permission::EditarResultados],
        sample_param: Some("idMuestra"),
    },
    RouteSpec {
        method: "POST",
        template: "/api/resultados/verificar/{idMuestra}",
        permissions: &[Permission::VerificarResultados],
        sample_param: Some("idMuestra"),
    },
    RouteSpec {
        method: "GET",
        template: "/api/auditoria/registros",
        permissions: &[Permission::VerAuditoria],
        sample_param: None,
    },
    RouteSpec {
        method: "GET",
        template: "/api/auditoria/exportar",
        permissions: &[Permission::ExportarAuditoria],
        sample_param: None,
    },
    RouteSpec {
        method: "GET",
        template: "/api/registro-muestras/validar-usuario",
        permissions: &[Permission::RegistrarMuestra],
        sample_param: None,
    },
    RouteSpec {
        method: "POST",
        template: "/api/auth/revocar",
        permissions: &[],
        sample_param: None,
    },
];

/// Looks up the catalog entry for a matched route.
#[must_use]
pub fn route_spec(method: &Method, template: &str) -> Option<&'static RouteSpec> {
    ROUTES.iter().find(|spec| spec.method == method.as_str() && spec.template == template)
}

// ============================================================================
// SECTION: Recorder
// ============================================================================

/// Message to the audit worker.
enum AuditCommand {
    /// Persist one record.
    Record(Box<AuditRecord>),
    /// Acknowledge once every earlier record has been handled.
    Flush(oneshot::Sender<()>),
}

/// Handle to the background audit worker.
#[derive(Clone)]
pub struct AuditRecorder {
    /// Bounded queue to the worker.
    sender: mpsc::Sender<AuditCommand>,
    /// Event sink for overflow reports.
    events: Arc<dyn EventSink>,
}

impl AuditRecorder {
    /// Spawns the worker on the current Tokio runtime.
    #[must_use]
    pub fn spawn(store: SharedAuditStore, capacity: usize, events: Arc<dyn EventSink>) -> Self {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        tokio::spawn(run_worker(receiver, store, Arc::clone(&events)));
        Self {
            sender,
            events,
        }
    }

    /// Queues a record without waiting. Drops it when the queue is full.
    pub fn record(&self, record: AuditRecord) {
        let route = record.accion.ruta.clone();
        match self.sender.try_send(AuditCommand::Record(Box::new(record))) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                self.events.record(&ServiceEvent::warn("audit_queue_full").with("route", route));
            }
            Err(TrySendError::Closed(_)) => {
                self.events
                    .record(&ServiceEvent::error("audit_worker_stopped").with("route", route));
            }
        }
    }

    /// Waits until every record queued before this call has been handled.
    pub async fn flush(&self) {
        let (done, wait) = oneshot::channel();
        if self.sender.send(AuditCommand::Flush(done)).await.is_ok() {
            let _ = wait.await;
        }
    }
}

/// Drains the audit queue.
async fn run_worker(
    mut receiver: mpsc::Receiver<AuditCommand>,
    store: SharedAuditStore,
    events: Arc<dyn EventSink>,
) {
    while let Some(command) = receiver.recv().await {
        match command {
            AuditCommand::Record(record) => {
                let store = store.clone();
                let route = record.accion.ruta.clone();
                let outcome = tokio::task::spawn_blocking(move || store.append(&record)).await;
                let failure = match outcome {
                    Ok(Ok(())) => None,
                    Ok(Err(err)) => Some(err.to_string()),
                    Err(err) => Some(err.to_string()),
                };
                if let Some(error) = failure {
                    events.record(
                        &ServiceEvent::error("audit_persist_failed")
                            .with("route", route)
                            .with("error", error),
                    );
                }
            }
            AuditCommand::Flush(done) => {
                let _ = done.send(());
            }
        }
    }
}

// ============================================================================
// SECTION: Middleware
// ============================================================================

/// Audits one request and its response.
pub async fn audit_request(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let (mut parts, body) = request.into_parts();
    let request_bytes = match axum::body::to_bytes(body, state.max_body_bytes).await {
        Ok(bytes) => bytes,
        Err(_) => {
            let response = ApiError::PayloadTooLarge(format!(
                "request body exceeds {} bytes",
                state.max_body_bytes
            ))
            .into_response();
            return finish(&state, &mut parts, &Bytes::new(), response).await;
        }
    };
    let forwarded = Request::from_parts(parts.clone(), Body::from(request_bytes.clone()));
    let response = next.run(forwarded).await;
    finish(&state, &mut parts, &request_bytes, response).await
}

/// Buffers the response, queues the audit record, and rebuilds the response.
async fn finish(
    state: &AppState,
    parts: &mut Parts,
    request_bytes: &Bytes,
    response: Response,
) -> Response {
    let (response_parts, body) = response.into_parts();
    let response_bytes = axum::body::to_bytes(body, usize::MAX).await.unwrap_or_default();
    if let Some(InternalErrorDetail(detail)) = response_parts.extensions.get() {
        state.events.record(
            &ServiceEvent::error("request_failed")
                .with("method", parts.method.as_str())
                .with("path", parts.uri.path())
                .with("error", detail.as_str()),
        );
    }
    let identity = response_parts.extensions.get::<Identity>();
    let status_code = response_parts.status.as_u16();
    let record = build_record(parts, identity, request_bytes, status_code, &response_bytes).await;
    state.recorder.record(record);
    Response::from_parts(response_parts, Body::from(response_bytes))
}

/// Builds the audit record for one exchange.
async fn build_record(
    parts: &mut Parts,
    identity: Option<&Identity>,
    request_bytes: &Bytes,
    status_code: u16,
    response_bytes: &Bytes,
) -> AuditRecord {
    let now = now_timestamp();
    let method = parts.method.as_str().to_string();
    let route = parts
        .uri
        .path_and_query()
        .map_or_else(|| parts.uri.path().to_string(), |path| path.as_str().to_string());
    let spec = parts
        .extensions
        .get::<MatchedPath>()
        .and_then(|matched| route_spec(&parts.method, matched.as_str()));
    let request_json: Option<Value> = serde_json::from_slice(request_bytes).ok();

    let path_sample = match spec.and_then(|spec| spec.sample_param) {
        Some(name) => parts.extract::<RawPathParams>().await.ok().and_then(|params| {
            params.iter().find(|(key, _)| *key == name).map(|(_, value)| value.to_string())
        }),
        None => None,
    };
    let sample_id = path_sample.or_else(|| {
        request_json
            .as_ref()
            .and_then(|body| body.get("idMuestra"))
            .and_then(Value::as_str)
            .map(str::to_string)
    });

    AuditRecord {
        id: RecordId::generate(now),
        usuario: identity.map_or_else(AuditActor::unknown, AuditActor::from),
        accion: AuditAction {
            tipo: method.clone(),
            descripcion: format!("{method} {route}"),
            ruta: route,
            required_permissions: spec.map(|spec| spec.permissions.to_vec()).unwrap_or_default(),
        },
        detalles: AuditDetails {
            sample_id,
            cambios: if parts.method == Method::PUT { request_json } else { None },
            ip: client_ip(parts),
            user_agent: parts
                .headers
                .get(USER_AGENT)
                .and_then(|value| value.to_str().ok())
                .map(str::to_string),
        },
        estado: AuditOutcome::from_status(status_code),
        status_code,
        mensaje: serde_json::from_slice(response_bytes).unwrap_or_else(|_| {
            Value::String(String::from_utf8_lossy(response_bytes).into_owned())
        }),
        fecha: now,
    }
}

/// Returns the peer address, falling back to `x-forwarded-for`.
fn client_ip(parts: &Parts) -> Option<String> {
    parts
        .extensions
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .or_else(|| {
            parts
                .headers
                .get("x-forwarded-for")
                .and_then(|value| value.to_str().ok())
                .and_then(|value| value.split(',').next())
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        })
}

// ============================================================================
// SECTION: Tests
// ============================================================================
