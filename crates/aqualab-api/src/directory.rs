// crates/aqualab-api/src/directory.rs
// ============================================================================
// Module: User Directory
// Description: Client for the external user service.
// Purpose: Confirm callers and look up administrators and clients by document.
// Dependencies: aqualab-core, async-trait, reqwest, serde
// ============================================================================

//! ## Overview
//! The user service owns accounts and roles. This module asks it who a
//! document number belongs to, whether a token's user still holds its role,
//! and tells it when a token is revoked. The caller's own bearer token is
//! forwarded on every call. Role labels arrive either as a string or as an
//! object with a `name` field and are normalized on ingestion.
//! Security posture: directory responses are untrusted; unknown roles make a
//! user invisible rather than guessing.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Mutex;
use std::time::Duration;

use aqualab_core::DirectoryUser;
use aqualab_core::Role;
use aqualab_core::RoleClaim;
use async_trait::async_trait;
use reqwest::Client;
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::Value;
use serde_json::json;
use thiserror::Error;

// ============================================================================
// SECTION: Interface
// ============================================================================

/// External user directory.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    /// Finds the user holding `document`.
    ///
    /// # Errors
    ///
    /// Returns [`DirectoryError`] when the directory rejects the caller or is
    /// unavailable.
    async fn find_by_document(
        &self,
        document: &str,
        bearer: &str,
    ) -> Result<Option<DirectoryUser>, DirectoryError>;

    /// Returns true when `user_id` exists and holds `role`.
    ///
    /// # Errors
    ///
    /// Returns [`DirectoryError`] when the directory rejects the caller or is
    /// unavailable.
    async fn confirm_user(
        &self,
        user_id: &str,
        role: Role,
        bearer: &str,
    ) -> Result<bool, DirectoryError>;

    /// Notifies the directory that `bearer` is revoked.
    ///
    /// # Errors
    ///
    /// Returns [`DirectoryError`] when the notification fails.
    async fn revoke_token(&self, bearer: &str) -> Result<(), DirectoryError>;
}

/// User directory failures.
#[derive(Debug, Error)]
pub enum DirectoryError {
    /// The directory refused the forwarded credentials.
    #[error("user directory rejected the request: {0}")]
    Rejected(String),
    /// The directory could not be reached or answered unexpectedly.
    #[error("user directory unavailable: {0}")]
    Unavailable(String),
}

// ============================================================================
// SECTION: HTTP Directory
// ============================================================================

/// User record as served by the directory API.
#[derive(Debug, Deserialize)]
struct WireUser {
    /// Directory identifier.
    #[serde(default, alias = "_id")]
    id: Option<Value>,
    /// Document number, string or numeric.
    #[serde(default)]
    documento: Option<Value>,
    /// Display name.
    #[serde(default)]
    nombre: Option<String>,
    /// Contact email.
    #[serde(default)]
    email: Option<String>,
    /// Role label in either upstream shape.
    #[serde(default)]
    rol: Option<RoleClaim>,
}

impl WireUser {
    /// Normalizes the record; users without a known role or document are
    /// dropped.
    fn normalize(self) -> Option<DirectoryUser> {
        let role = self.rol.as_ref()?.normalize().ok()?;
        let document = scalar_text(self.documento.as_ref()?)?;
        Some(DirectoryUser {
            id: self.id.as_ref().and_then(scalar_text).unwrap_or_default(),
            document,
            name: self.nombre,
            email: self.email,
            role,
        })
    }
}

/// HTTP-backed user directory.
///
/// # Invariants
/// - Base URL is normalized without a trailing slash.
pub struct HttpUserDirectory {
    /// Directory base URL (no trailing slash).
    base_url: String,
    /// HTTP client configured with timeouts.
    client: Client,
}

impl HttpUserDirectory {
    /// Builds a directory client.
    ///
    /// # Errors
    ///
    /// Returns [`DirectoryError::Unavailable`] when the HTTP client cannot be
    /// built.
    pub fn new(
        base_url: &str,
        connect_timeout: Duration,
        request_timeout: Duration,
    ) -> Result<Self, DirectoryError> {
        let client = Client::builder()
            .connect_timeout(connect_timeout)
            .timeout(request_timeout)
            .build()
            .map_err(|err| DirectoryError::Unavailable(err.to_string()))?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        })
    }

    /// Lists every user visible to the caller.
    async fn list_users(&self, bearer: &str) -> Result<Vec<DirectoryUser>, DirectoryError> {
        let response = self
            .client
            .get(format!("{}/usuarios", self.base_url))
            .bearer_auth(bearer)
            .send()
            .await
            .map_err(|err| DirectoryError::Unavailable(err.to_string()))?;
        check_status(response.status())?;
        let body: Value =
            response.json().await.map_err(|err| DirectoryError::Unavailable(err.to_string()))?;
        Ok(parse_users(body))
    }
}

#[async_trait]
impl UserDirectory for HttpUserDirectory {
    async fn find_by_document(
        &self,
        document: &str,
        bearer: &str,
    ) -> Result<Option<DirectoryUser>, DirectoryError> {
        let document = document.trim();
        Ok(self.list_users(bearer).await?.into_iter().find(|user| user.document == document))
    }

    async fn confirm_user(
        &self,
        user_id: &str,
        role: Role,
        bearer: &str,
    ) -> Result<bool, DirectoryError> {
        Ok(self
            .list_users(bearer)
            .await?
            .iter()
            .any(|user| user.id == user_id && user.role == role))
    }

    async fn revoke_token(&self, bearer: &str) -> Result<(), DirectoryError> {
        let response = self
            .client
            .post(format!("{}/auth/revoke", self.base_url))
            .bearer_auth(bearer)
            .json(&json!({ "token": bearer }))
            .send()
            .await
            .map_err(|err| DirectoryError::Unavailable(err.to_string()))?;
        check_status(response.status())
    }
}

/// Maps directory status codes onto errors.
fn check_status(status: StatusCode) -> Result<(), DirectoryError> {
    match status {
        status if status.is_success() => Ok(()),
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            Err(DirectoryError::Rejected(format!("status {status}")))
        }
        status => Err(DirectoryError::Unavailable(format!("status {status}"))),
    }
}

/// Parses a user listing; a single object is treated as a one-user list.
fn parse_users(body: Value) -> Vec<DirectoryUser> {
    let entries = match body {
        Value::Array(entries) => entries,
        Value::Object(_) => vec![body],
        _ => Vec::new(),
    };
    entries
        .into_iter()
        .filter_map(|entry| serde_json::from_value::<WireUser>(entry).ok())
        .filter_map(WireUser::normalize)
        .collect()
}

/// Renders a string or number as text.
fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(text) => Some(text.trim().to_string()),
        Value::Number(number) => Some(number.to_string()),
        _ => None,
    }
}

// ============================================================================
// SECTION: Static Directory
// ============================================================================

/// Fixed in-process directory for tests and offline deployments.
pub struct StaticUserDirectory {
    /// Known users.
    users: Vec<DirectoryUser>,
    /// Tokens reported as revoked.
    revoked: Mutex<Vec<String>>,
    /// Whether the directory answers at all.
    available: bool,
}

impl StaticUserDirectory {
    /// Builds a directory serving `users`.
    #[must_use]
    pub const fn new(users: Vec<DirectoryUser>) -> Self {
        Self {
            users,
            revoked: Mutex::new(Vec::new()),
            available: true,
        }
    }

    /// Builds a directory that fails every call as unavailable.
    #[must_use]
    pub const fn unavailable() -> Self {
        Self {
            users: Vec::new(),
            revoked: Mutex::new(Vec::new()),
            available: false,
        }
    }

    /// Returns the tokens revoked so far.
    #[must_use]
    pub fn revoked_tokens(&self) -> Vec<String> {
        self.revoked.lock().map(|revoked| revoked.clone()).unwrap_or_default()
    }

    /// Fails when the directory is configured as unavailable or the token
    /// has been revoked.
    fn check(&self, bearer: &str) -> Result<(), DirectoryError> {
        if !self.available {
            return Err(DirectoryError::Unavailable("directory offline".to_string()));
        }
        let revoked = self
            .revoked
            .lock()
            .map_err(|_| DirectoryError::Unavailable("mutex poisoned".to_string()))?;
        if revoked.iter().any(|token| token == bearer) {
            return Err(DirectoryError::Rejected("token revoked".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl UserDirectory for StaticUserDirectory {
    async fn find_by_document(
        &self,
        document: &str,
        bearer: &str,
    ) -> Result<Option<DirectoryUser>, DirectoryError> {
        self.check(bearer)?;
        let document = document.trim();
        Ok(self.users.iter().find(|user| user.document == document).cloned())
    }

    async fn confirm_user(
        &self,
        user_id: &str,
        role: Role,
        bearer: &str,
    ) -> Result<bool, DirectoryError> {
        self.check(bearer)?;
        Ok(self.users.iter().any(|user| user.id == user_id && user.role == role))
    }

    async fn revoke_token(&self, bearer: &str) -> Result<(), DirectoryError> {
        if !self.available {
            return Err(DirectoryError::Unavailable("directory offline".to_string()));
        }
        self.revoked
            .lock()
            .map_err(|_| DirectoryError::Unavailable("mutex poisoned".to_string()))?
            .push(bearer.to_string());
        Ok(())
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================
