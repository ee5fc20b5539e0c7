// crates/aqualab-core/src/core/identity.rs
// ============================================================================
// Module: AquaLab Identity
// Description: Request-scoped caller identity and directory user records.
// Purpose: Carry who is acting through guards, history, and audit snapshots.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! An [`Identity`] is derived per request from a bearer token and is never
//! persisted by the core. Lifecycle managers read it to authorize and to stamp
//! history entries through the lighter [`Actor`] snapshot.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeSet;

use serde::Deserialize;
use serde::Serialize;

use crate::core::roles::Permission;
use crate::core::roles::Role;
use crate::core::time::Timestamp;

// ============================================================================
// SECTION: Identity
// ============================================================================

/// Resolved caller identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    /// User identifier issued by the user service.
    pub user_id: String,
    /// National document number (cedula).
    pub document: String,
    /// Display name when the token carries one.
    #[serde(default)]
    pub name: Option<String>,
    /// Normalized role.
    pub role: Role,
    /// Permissions granted at request time.
    pub permissions: BTreeSet<Permission>,
    /// Token expiry, when present.
    #[serde(default)]
    pub expires_at: Option<Timestamp>,
}

impl Identity {
    /// Builds an identity whose permissions come from the role table.
    #[must_use]
    pub fn with_role_permissions(
        user_id: impl Into<String>,
        document: impl Into<String>,
        role: Role,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            document: document.into(),
            name: None,
            role,
            permissions: role.permissions().iter().copied().collect(),
            expires_at: None,
        }
    }

    /// Sets the display name.
    #[must_use]
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Returns the history snapshot for this identity.
    #[must_use]
    pub fn actor(&self) -> Actor {
        Actor {
            document: self.document.clone(),
            name: self.name.clone(),
        }
    }
}

/// Actor snapshot stamped into entity history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    /// Document number of the acting user.
    pub document: String,
    /// Display name of the acting user.
    pub name: Option<String>,
}

// ============================================================================
// SECTION: Directory Users
// ============================================================================

/// User record reported by the external user directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectoryUser {
    /// Directory user identifier.
    pub id: String,
    /// Document number.
    pub document: String,
    /// Display name.
    #[serde(default)]
    pub name: Option<String>,
    /// Contact email.
    #[serde(default)]
    pub email: Option<String>,
    /// Normalized role.
    pub role: Role,
}
