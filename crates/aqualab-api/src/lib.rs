// crates/aqualab-api/src/lib.rs
// ============================================================================
// Module: AquaLab API
// Description: HTTP server for the water-laboratory service.
// Purpose: Expose sample, result, and audit operations over JSON/HTTP.
// Dependencies: aqualab-core, aqualab-config, axum, tokio, reqwest
// ============================================================================

//! ## Overview
//! `aqualab-api` wires the lifecycle managers from `aqualab-core` into an
//! axum router. Every `/api` route resolves a bearer token into an
//! [`aqualab_core::Identity`] and checks the route's permission before the
//! handler runs. Every request, including rejected ones, produces one audit
//! record that a background worker persists off the request path.
//! Security posture: tokens and request bodies are untrusted input.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod audit;
pub mod auth;
pub mod directory;
pub mod error;
pub mod handlers;
pub mod server;
pub mod telemetry;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use audit::AuditRecorder;
pub use audit::ROUTES;
pub use audit::RouteSpec;
pub use auth::AuthError;
pub use auth::Caller;
pub use auth::IdentityResolver;
pub use auth::InMemoryTokenCache;
pub use auth::TokenCache;
pub use auth::TokenClaims;
pub use directory::DirectoryError;
pub use directory::HttpUserDirectory;
pub use directory::StaticUserDirectory;
pub use directory::UserDirectory;
pub use error::ApiError;
pub use handlers::AppState;
pub use server::LabComponents;
pub use server::LabServer;
pub use server::LabServerError;
pub use server::build_router;
pub use telemetry::EventLevel;
pub use telemetry::EventSink;
pub use telemetry::FileEventSink;
pub use telemetry::NoopEventSink;
pub use telemetry::ServiceEvent;
pub use telemetry::StderrEventSink;
