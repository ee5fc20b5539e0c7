// crates/aqualab-api/src/server.rs
// ============================================================================
// Module: AquaLab Server
// Description: Component wiring, router construction, and the HTTP listener.
// Purpose: Build the service from configuration and serve it over HTTP.
// Dependencies: aqualab-config, aqualab-core, aqualab-store-sqlite, axum, tokio
// ============================================================================

//! ## Overview
//! [`LabServer::from_config`] validates configuration and builds the event
//! sink, stores, user directory, token cache, and audit recorder. Tests wire
//! their own collaborators through [`LabComponents`]. [`build_router`] lays
//! out the route table: `/api` routes sit behind the authentication layer,
//! and the audit layer wraps everything including the fallback.
//! Construction spawns the audit worker and must run inside a Tokio runtime.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use aqualab_config::LabConfig;
use aqualab_config::LogSinkKind;
use aqualab_config::RoleConfirmation;
use aqualab_config::StoreType;
use aqualab_core::DeletePolicy;
use aqualab_core::InMemoryAuditStore;
use aqualab_core::InMemoryLabStore;
use aqualab_core::ResultLifecycle;
use aqualab_core::SampleLifecycle;
use aqualab_core::SharedAuditStore;
use aqualab_core::SharedLabStore;
use aqualab_store_sqlite::SqliteLabStore;
use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::middleware;
use axum::routing::get;
use axum::routing::post;
use axum::routing::put;

use crate::audit::AuditRecorder;
use crate::audit::audit_request;
use crate::auth::IdentityResolver;
use crate::auth::InMemoryTokenCache;
use crate::auth::TokenCache;
use crate::directory::HttpUserDirectory;
use crate::directory::UserDirectory;
use crate::handlers;
use crate::handlers::AppState;
use crate::telemetry::EventSink;
use crate::telemetry::FileEventSink;
use crate::telemetry::NoopEventSink;
use crate::telemetry::ServiceEvent;
use crate::telemetry::StderrEventSink;

// ============================================================================
// SECTION: Components
// ============================================================================

/// Collaborators needed to assemble the router state.
pub struct LabComponents {
    /// Sample and result store.
    pub lab_store: SharedLabStore,
    /// Audit record store.
    pub audit_store: SharedAuditStore,
    /// External user directory.
    pub directory: Arc<dyn UserDirectory>,
    /// Resolved identity cache.
    pub token_cache: Arc<dyn TokenCache>,
    /// Service event sink.
    pub events: Arc<dyn EventSink>,
    /// Role confirmation mode.
    pub role_confirmation: RoleConfirmation,
    /// Sample deletion policy.
    pub delete_policy: DeletePolicy,
    /// Audit queue capacity.
    pub audit_queue_capacity: usize,
    /// Maximum accepted request body size.
    pub max_body_bytes: usize,
}

impl LabComponents {
    /// In-memory components with default limits around `directory`.
    #[must_use]
    pub fn in_memory(directory: Arc<dyn UserDirectory>) -> Self {
        let config = LabConfig::default();
        Self {
            lab_store: SharedLabStore::from_store(InMemoryLabStore::new()),
            audit_store: SharedAuditStore::from_store(InMemoryAuditStore::new()),
            directory,
            token_cache: Arc::new(InMemoryTokenCache::new(
                config.auth.token_cache_ttl_secs,
                config.auth.token_cache_max_entries,
            )),
            events: Arc::new(NoopEventSink),
            role_confirmation: config.auth.role_confirmation,
            delete_policy: config.policy.delete_policy(),
            audit_queue_capacity: config.server.audit.queue_capacity,
            max_body_bytes: config.server.max_body_bytes,
        }
    }

    /// Builds the router state and spawns the audit worker.
    #[must_use]
    pub fn into_state(self) -> AppState {
        let recorder = AuditRecorder::spawn(
            self.audit_store.clone(),
            self.audit_queue_capacity,
            Arc::clone(&self.events),
        );
        AppState {
            samples: SampleLifecycle::with_delete_policy(
                self.lab_store.clone(),
                self.delete_policy,
            ),
            results: ResultLifecycle::new(self.lab_store),
            audit_store: self.audit_store,
            resolver: IdentityResolver::new(
                self.token_cache,
                Arc::clone(&self.directory),
                self.role_confirmation,
            ),
            directory: self.directory,
            recorder,
            events: self.events,
            max_body_bytes: self.max_body_bytes,
        }
    }
}

// ============================================================================
// SECTION: Server
// ============================================================================

/// AquaLab HTTP server.
pub struct LabServer {
    /// Validated configuration.
    config: LabConfig,
    /// Router state.
    state: AppState,
}

impl LabServer {
    /// Builds a server from configuration.
    ///
    /// # Errors
    ///
    /// Returns [`LabServerError`] when configuration is invalid or a
    /// collaborator cannot be initialized.
    pub fn from_config(config: LabConfig) -> Result<Self, LabServerError> {
        config.validate().map_err(|err| LabServerError::Config(err.to_string()))?;
        let events = build_event_sink(&config)?;
        let (lab_store, audit_store) = build_stores(&config)?;
        let directory: Arc<dyn UserDirectory> = Arc::new(
            HttpUserDirectory::new(
                config.user_directory.base_url(),
                Duration::from_millis(config.user_directory.connect_timeout_ms),
                Duration::from_millis(config.user_directory.request_timeout_ms),
            )
            .map_err(|err| LabServerError::Init(err.to_string()))?,
        );
        let components = LabComponents {
            lab_store,
            audit_store,
            directory,
            token_cache: Arc::new(InMemoryTokenCache::new(
                config.auth.token_cache_ttl_secs,
                config.auth.token_cache_max_entries,
            )),
            events,
            role_confirmation: config.auth.role_confirmation,
            delete_policy: config.policy.delete_policy(),
            audit_queue_capacity: config.server.audit.queue_capacity,
            max_body_bytes: config.server.max_body_bytes,
        };
        Ok(Self {
            state: components.into_state(),
            config,
        })
    }

    /// Returns the router for this server.
    #[must_use]
    pub fn router(&self) -> Router {
        build_router(self.state.clone())
    }

    /// Returns the router state.
    #[must_use]
    pub const fn state(&self) -> &AppState {
        &self.state
    }

    /// Serves HTTP until Ctrl-C, then drains the audit queue.
    ///
    /// # Errors
    ///
    /// Returns [`LabServerError`] when binding or serving fails.
    pub async fn serve(self) -> Result<(), LabServerError> {
        let addr =
            self.config.server.bind_addr().map_err(|err| LabServerError::Config(err.to_string()))?;
        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .map_err(|err| LabServerError::Transport(format!("http bind failed: {err}")))?;
        let local = listener.local_addr().map_or_else(|_| addr.to_string(), |a| a.to_string());
        self.state.events.record(
            &ServiceEvent::info("server_started")
                .with("bind", local)
                .with("store", store_label(self.config.store.store_type)),
        );
        let app = self.router();
        let served = axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
            .with_graceful_shutdown(shutdown_signal())
            .await
            .map_err(|err| LabServerError::Transport(format!("http server failed: {err}")));
        self.state.recorder.flush().await;
        self.state.events.record(&ServiceEvent::info("server_stopped"));
        served
    }
}

/// Resolves when the process receives Ctrl-C.
async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}

/// Returns the configured store label.
const fn store_label(store_type: StoreType) -> &'static str {
    match store_type {
        StoreType::Memory => "memory",
        StoreType::Sqlite => "sqlite",
    }
}

/// Builds the service event sink from configuration.
fn build_event_sink(config: &LabConfig) -> Result<Arc<dyn EventSink>, LabServerError> {
    let sink: Arc<dyn EventSink> = match config.server.log.sink {
        LogSinkKind::Stderr => Arc::new(StderrEventSink),
        LogSinkKind::Disabled => Arc::new(NoopEventSink),
        LogSinkKind::File => {
            let path = config.server.log.path.as_deref().ok_or_else(|| {
                LabServerError::Config("file log sink requires server.log.path".to_string())
            })?;
            let sink = FileEventSink::new(Path::new(path))
                .map_err(|err| LabServerError::Init(format!("event log open failed: {err}")))?;
            Arc::new(sink)
        }
    };
    Ok(sink)
}

/// Builds the lab and audit stores from configuration.
fn build_stores(config: &LabConfig) -> Result<(SharedLabStore, SharedAuditStore), LabServerError> {
    match config.store.store_type {
        StoreType::Memory => Ok((
            SharedLabStore::from_store(InMemoryLabStore::new()),
            SharedAuditStore::from_store(InMemoryAuditStore::new()),
        )),
        StoreType::Sqlite => {
            let sqlite_config = config.store.sqlite().ok_or_else(|| {
                LabServerError::Config("sqlite store requires path".to_string())
            })?;
            let store = SqliteLabStore::new(&sqlite_config)
                .map_err(|err| LabServerError::Init(err.to_string()))?;
            Ok((SharedLabStore::from_store(store.clone()), SharedAuditStore::from_store(store)))
        }
    }
}

// ============================================================================
// SECTION: Router
// ============================================================================

/// Builds the full route table around `state`.
pub fn build_router(state: AppState) -> Router {
    let api = Router::new()
        .route("/api/muestras", get(handlers::list_samples).post(handlers::create_sample))
        .route("/api/muestras/tipo/{tipo}", get(handlers::samples_by_water_type))
        .route("/api/muestras/estado/{estado}", get(handlers::samples_by_state))
        .route(
            "/api/muestras/{id}",
            get(handlers::get_sample).put(handlers::update_sample).delete(handlers::delete_sample),
        )
        .route("/api/muestras/{id}/firma", post(handlers::register_signature))
        .route("/api/resultados/resultados", get(handlers::list_results))
        .route("/api/resultados/muestra/{idMuestra}", get(handlers::get_result))
        .route("/api/resultados/registrar/{idMuestra}", post(handlers::register_result))
        .route("/api/resultados/editar/{idMuestra}", put(handlers::edit_result))
        .route("/api/resultados/verificar/{idMuestra}", post(handlers::verify_result))
        .route("/api/auditoria/registros", get(handlers::audit_records))
        .route("/api/auditoria/exportar", get(handlers::export_audit))
        .route("/api/registro-muestras/validar-usuario", get(handlers::validate_user))
        .route("/api/auth/revocar", post(handlers::revoke_token))
        .route_layer(middleware::from_fn_with_state(state.clone(), handlers::authenticate));
    let max_body_bytes = state.max_body_bytes;
    Router::new()
        .route("/", get(handlers::banner))
        .merge(api)
        .fallback(handlers::not_found)
        .layer(middleware::from_fn_with_state(state.clone(), audit_request))
        .layer(DefaultBodyLimit::max(max_body_bytes))
        .with_state(state)
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// AquaLab server errors.
#[derive(Debug, thiserror::Error)]
pub enum LabServerError {
    /// Configuration errors.
    #[error("config error: {0}")]
    Config(String),
    /// Initialization errors.
    #[error("init error: {0}")]
    Init(String),
    /// Transport errors.
    #[error("transport error: {0}")]
    Transport(String),
}
