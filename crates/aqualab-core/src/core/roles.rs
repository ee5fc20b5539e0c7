// crates/aqualab-core/src/core/roles.rs
// ============================================================================
// Module: AquaLab Roles and Permissions
// Description: Fixed role-to-permission table and the permission guard.
// Purpose: Decide whether a resolved identity may perform an action.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! Three roles exist and each maps to a fixed permission set. The table is
//! static for the life of the process. Upstream services describe roles either
//! as a plain string or as an object with a `name` field; [`RoleClaim`] absorbs
//! both shapes at the boundary so nothing downstream sees the difference.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;

use serde::Deserialize;
use serde::Serialize;

use crate::core::error::LabError;
use crate::core::identity::Identity;

// ============================================================================
// SECTION: Roles
// ============================================================================

/// Laboratory role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Administrator: registers samples and manages users.
    Administrador,
    /// Lab technician: registers, edits, and verifies results.
    Laboratorista,
    /// Client: submits samples and reads their outcome.
    Cliente,
}

impl Role {
    /// All roles, in table order.
    pub const ALL: [Self; 3] = [Self::Administrador, Self::Laboratorista, Self::Cliente];

    /// Returns the wire label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Administrador => "administrador",
            Self::Laboratorista => "laboratorista",
            Self::Cliente => "cliente",
        }
    }

    /// Parses a role label, ignoring case and surrounding whitespace.
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        let normalized = raw.trim().to_lowercase();
        Self::ALL.into_iter().find(|role| role.as_str() == normalized)
    }

    /// Returns the fixed permission set for this role.
    #[must_use]
    pub const fn permissions(self) -> &'static [Permission] {
        match self {
            Self::Administrador => ADMINISTRATOR_PERMISSIONS,
            Self::Laboratorista => TECHNICIAN_PERMISSIONS,
            Self::Cliente => CLIENT_PERMISSIONS,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Raw role claim as delivered by upstream services.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RoleClaim {
    /// Plain role label.
    Name(String),
    /// Role object carrying a `name` field.
    Object {
        /// Role label.
        name: String,
    },
}

impl RoleClaim {
    /// Normalizes the claim into a [`Role`].
    ///
    /// # Errors
    ///
    /// Returns [`LabError::Authentication`] when the label is not a known role.
    pub fn normalize(&self) -> Result<Role, LabError> {
        let label = match self {
            Self::Name(name) | Self::Object { name } => name,
        };
        Role::parse(label)
            .ok_or_else(|| LabError::Authentication(format!("unknown role: {}", label.trim())))
    }
}

// ============================================================================
// SECTION: Permissions
// ============================================================================

/// Action token checked by the permission guard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Permission {
    /// Register a new sample.
    RegistrarMuestra,
    /// Read samples.
    VerMuestras,
    /// Edit sample descriptive fields.
    EditarMuestra,
    /// Delete a sample.
    EliminarMuestra,
    /// Register lab results.
    RegistrarResultados,
    /// Read lab results.
    VerResultados,
    /// Edit unverified lab results.
    EditarResultados,
    /// Verify lab results.
    VerificarResultados,
    /// Manage users.
    GestionarUsuarios,
    /// Read users.
    VerUsuarios,
    /// Read audit records.
    VerAuditoria,
    /// Export audit records.
    ExportarAuditoria,
    /// Filter audit records.
    FiltrarAuditoria,
}

impl Permission {
    /// Every permission token.
    pub const ALL: [Self; 13] = [
        Self::RegistrarMuestra,
        Self::VerMuestras,
        Self::EditarMuestra,
        Self::EliminarMuestra,
        Self::RegistrarResultados,
        Self::VerResultados,
        Self::EditarResultados,
        Self::VerificarResultados,
        Self::GestionarUsuarios,
        Self::VerUsuarios,
        Self::VerAuditoria,
        Self::ExportarAuditoria,
        Self::FiltrarAuditoria,
    ];

    /// Returns the wire token.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::RegistrarMuestra => "registrar_muestra",
            Self::VerMuestras => "ver_muestras",
            Self::EditarMuestra => "editar_muestra",
            Self::EliminarMuestra => "eliminar_muestra",
            Self::RegistrarResultados => "registrar_resultados",
            Self::VerResultados => "ver_resultados",
            Self::EditarResultados => "editar_resultados",
            Self::VerificarResultados => "verificar_resultados",
            Self::GestionarUsuarios => "gestionar_usuarios",
            Self::VerUsuarios => "ver_usuarios",
            Self::VerAuditoria => "ver_auditoria",
            Self::ExportarAuditoria => "exportar_auditoria",
            Self::FiltrarAuditoria => "filtrar_auditoria",
        }
    }

    /// Parses a wire token. Unknown tokens yield `None`.
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        Self::ALL.into_iter().find(|permission| permission.as_str() == raw)
    }
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Administrator permission set.
const ADMINISTRATOR_PERMISSIONS: &[Permission] = &[
    Permission::RegistrarMuestra,
    Permission::VerMuestras,
    Permission::EditarMuestra,
    Permission::EliminarMuestra,
    Permission::VerResultados,
    Permission::GestionarUsuarios,
    Permission::VerUsuarios,
    Permission::VerAuditoria,
    Permission::ExportarAuditoria,
    Permission::FiltrarAuditoria,
];

/// Lab technician permission set.
const TECHNICIAN_PERMISSIONS: &[Permission] = &[
    Permission::VerMuestras,
    Permission::RegistrarResultados,
    Permission::VerResultados,
    Permission::EditarResultados,
    Permission::VerificarResultados,
    Permission::VerAuditoria,
    Permission::FiltrarAuditoria,
];

/// Client permission set.
const CLIENT_PERMISSIONS: &[Permission] = &[Permission::VerMuestras, Permission::VerResultados];

// ============================================================================
// SECTION: Guard
// ============================================================================

/// Returns true when the role table grants `permission` to `role`.
#[must_use]
pub fn role_allows(role: Role, permission: Permission) -> bool {
    role.permissions().contains(&permission)
}

/// Permission guard: allows only identities carrying `required`.
///
/// # Errors
///
/// Returns [`LabError::Authorization`] naming the missing permission.
pub fn require_permission(identity: &Identity, required: Permission) -> Result<(), LabError> {
    if identity.permissions.contains(&required) {
        return Ok(());
    }
    Err(LabError::Authorization(format!("missing required permission: {required}")))
}
