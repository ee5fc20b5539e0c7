// crates/aqualab-api/src/error.rs
// ============================================================================
// Module: API Errors
// Description: Error-to-response translation and response envelopes.
// Purpose: Map every failure kind onto one status code and JSON envelope.
// Dependencies: aqualab-core, axum, serde_json
// ============================================================================

//! ## Overview
//! Handlers return [`ApiError`]; its [`IntoResponse`] implementation emits
//! `{ "success": false, "message": ... }` with the status for the error kind.
//! Internal failures additionally attach an [`InternalErrorDetail`] response
//! extension so the audit layer can write them to the service event log.

// ============================================================================
// SECTION: Imports
// ============================================================================

use aqualab_core::LabError;
use axum::Json;
use axum::body::Bytes;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::response::Response;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use serde_json::json;
use thiserror::Error;

use crate::auth::AuthError;
use crate::directory::DirectoryError;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// HTTP-facing error.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Malformed input or a violated precondition.
    #[error("{0}")]
    Validation(String),
    /// Missing, invalid, or expired credentials.
    #[error("{0}")]
    Authentication(String),
    /// Authenticated caller lacks a permission.
    #[error("{0}")]
    Authorization(String),
    /// Addressed entity or route does not exist.
    #[error("{0}")]
    NotFound(String),
    /// Request body exceeds the configured limit.
    #[error("{0}")]
    PayloadTooLarge(String),
    /// Unanticipated failure.
    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    /// Returns the HTTP status for this error.
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        match self {
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::Authentication(_) => StatusCode::UNAUTHORIZED,
            Self::Authorization(_) => StatusCode::FORBIDDEN,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Response extension carrying the detail of an internal failure.
#[derive(Debug, Clone)]
pub struct InternalErrorDetail(pub String);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = self.to_string();
        let mut response =
            (status, Json(json!({ "success": false, "message": message }))).into_response();
        if let Self::Internal(detail) = self {
            response.extensions_mut().insert(InternalErrorDetail(detail));
        }
        response
    }
}

impl From<LabError> for ApiError {
    fn from(err: LabError) -> Self {
        match err {
            LabError::Validation(message) => Self::Validation(message),
            LabError::NotFound(message) => Self::NotFound(message),
            LabError::Authentication(message) => Self::Authentication(message),
            LabError::Authorization(message) => Self::Authorization(message),
            LabError::Store(err) => Self::Internal(err.to_string()),
        }
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::Unauthenticated(message) => Self::Authentication(message),
            AuthError::Unavailable(message) => {
                Self::Internal(format!("user directory unavailable: {message}"))
            }
        }
    }
}

impl From<DirectoryError> for ApiError {
    fn from(err: DirectoryError) -> Self {
        match err {
            DirectoryError::Rejected(message) => Self::Authentication(message),
            DirectoryError::Unavailable(_) => Self::Internal(err.to_string()),
        }
    }
}

// ============================================================================
// SECTION: Envelopes
// ============================================================================

/// Success envelope with data.
///
/// # Errors
///
/// Returns [`ApiError::Internal`] when `data` cannot be serialized.
pub fn ok<T: Serialize>(data: &T) -> Result<Response, ApiError> {
    envelope(StatusCode::OK, None, data)
}

/// Success envelope with a message and data.
///
/// # Errors
///
/// Returns [`ApiError::Internal`] when `data` cannot be serialized.
pub fn ok_with_message<T: Serialize>(message: &str, data: &T) -> Result<Response, ApiError> {
    envelope(StatusCode::OK, Some(message), data)
}

/// Creation envelope (201) with a message and data.
///
/// # Errors
///
/// Returns [`ApiError::Internal`] when `data` cannot be serialized.
pub fn created<T: Serialize>(message: &str, data: &T) -> Result<Response, ApiError> {
    envelope(StatusCode::CREATED, Some(message), data)
}

/// Builds a success envelope.
fn envelope<T: Serialize>(
    status: StatusCode,
    message: Option<&str>,
    data: &T,
) -> Result<Response, ApiError> {
    let data = serde_json::to_value(data).map_err(|err| ApiError::Internal(err.to_string()))?;
    let mut body = json!({ "success": true, "data": data });
    if let (Some(message), Value::Object(map)) = (message, &mut body) {
        map.insert("message".to_string(), Value::String(message.to_string()));
    }
    Ok((status, Json(body)).into_response())
}

/// Parses a JSON request body.
///
/// # Errors
///
/// Returns [`ApiError::Validation`] when the body is empty or malformed.
pub fn parse_json<T: DeserializeOwned>(body: &Bytes) -> Result<T, ApiError> {
    if body.is_empty() {
        return Err(ApiError::Validation("request body is required".to_string()));
    }
    serde_json::from_slice(body)
        .map_err(|err| ApiError::Validation(format!("invalid request body: {err}")))
}
