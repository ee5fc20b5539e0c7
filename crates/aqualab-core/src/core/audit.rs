// crates/aqualab-core/src/core/audit.rs
// ============================================================================
// Module: AquaLab Audit Model
// Description: Append-only audit records and the paginated audit query.
// Purpose: Describe who did what through the API and with what outcome.
// Dependencies: serde, serde_json
// ============================================================================

//! ## Overview
//! One [`AuditRecord`] is written per HTTP request. Records are immutable once
//! stored. [`AuditQuery`] carries the filters and page window; its
//! [`AuditQuery::matches`] predicate is the reference semantics every
//! [`crate::AuditStore`] implementation must agree with.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

use crate::core::error::LabError;
use crate::core::identifiers::RecordId;
use crate::core::identity::Identity;
use crate::core::roles::Permission;
use crate::core::time::Timestamp;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Placeholder recorded for unauthenticated callers.
pub const UNKNOWN_ACTOR: &str = "desconocido";
/// Default page size.
pub const DEFAULT_PAGE_LIMIT: u32 = 10;
/// Maximum page size.
pub const MAX_PAGE_LIMIT: u32 = 100;

// ============================================================================
// SECTION: Records
// ============================================================================

/// Snapshot of the caller at request time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditActor {
    /// User identifier.
    pub id: String,
    /// Display name.
    pub nombre: String,
    /// Role label.
    pub rol: String,
    /// Document number.
    pub documento: String,
    /// Permissions held.
    pub permisos: Vec<String>,
}

impl AuditActor {
    /// Snapshot for an unauthenticated caller.
    #[must_use]
    pub fn unknown() -> Self {
        Self {
            id: UNKNOWN_ACTOR.to_string(),
            nombre: UNKNOWN_ACTOR.to_string(),
            rol: UNKNOWN_ACTOR.to_string(),
            documento: UNKNOWN_ACTOR.to_string(),
            permisos: Vec::new(),
        }
    }
}

impl From<&Identity> for AuditActor {
    fn from(identity: &Identity) -> Self {
        Self {
            id: identity.user_id.clone(),
            nombre: identity.name.clone().unwrap_or_else(|| UNKNOWN_ACTOR.to_string()),
            rol: identity.role.as_str().to_string(),
            documento: identity.document.clone(),
            permisos: identity.permissions.iter().map(|p| p.as_str().to_string()).collect(),
        }
    }
}

/// Action descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditAction {
    /// HTTP method.
    pub tipo: String,
    /// Request path.
    pub ruta: String,
    /// Human-readable description.
    pub descripcion: String,
    /// Permissions the route required.
    #[serde(rename = "permisosRequeridos")]
    pub required_permissions: Vec<Permission>,
}

/// Request context.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AuditDetails {
    /// Affected sample business key.
    #[serde(rename = "idMuestra", default, skip_serializing_if = "Option::is_none")]
    pub sample_id: Option<String>,
    /// Request body of an update.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cambios: Option<Value>,
    /// Caller address.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip: Option<String>,
    /// Caller user agent.
    #[serde(rename = "userAgent", default, skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
}

/// Request outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditOutcome {
    /// Status below 400.
    Exitoso,
    /// Status 400 or above.
    Fallido,
}

impl AuditOutcome {
    /// Derives the outcome from an HTTP status code.
    #[must_use]
    pub const fn from_status(status: u16) -> Self {
        if status < 400 { Self::Exitoso } else { Self::Fallido }
    }

    /// Returns the wire label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Exitoso => "exitoso",
            Self::Fallido => "fallido",
        }
    }

    /// Parses a wire label.
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_lowercase().as_str() {
            "exitoso" => Some(Self::Exitoso),
            "fallido" => Some(Self::Fallido),
            _ => None,
        }
    }
}

/// Persisted audit record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditRecord {
    /// Record identifier.
    #[serde(rename = "_id")]
    pub id: RecordId,
    /// Caller snapshot.
    pub usuario: AuditActor,
    /// Action descriptor.
    pub accion: AuditAction,
    /// Request context.
    pub detalles: AuditDetails,
    /// Outcome.
    pub estado: AuditOutcome,
    /// HTTP status code.
    #[serde(rename = "codigoEstado")]
    pub status_code: u16,
    /// Raw response payload.
    pub mensaje: Value,
    /// Record time.
    pub fecha: Timestamp,
}

// ============================================================================
// SECTION: Query
// ============================================================================

/// Audit query filters and page window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditQuery {
    /// Inclusive lower time bound.
    pub from: Option<Timestamp>,
    /// Inclusive upper time bound.
    pub to: Option<Timestamp>,
    /// Actor id, document, or name.
    pub user: Option<String>,
    /// Actor role label.
    pub role: Option<String>,
    /// HTTP method or route fragment.
    pub action: Option<String>,
    /// Outcome.
    pub outcome: Option<AuditOutcome>,
    /// One-based page number.
    pub page: u32,
    /// Page size.
    pub limit: u32,
}

impl Default for AuditQuery {
    fn default() -> Self {
        Self {
            from: None,
            to: None,
            user: None,
            role: None,
            action: None,
            outcome: None,
            page: 1,
            limit: DEFAULT_PAGE_LIMIT,
        }
    }
}

/// Raw query-string parameters as received over HTTP.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditQueryParams {
    /// Lower bound (RFC 3339).
    pub fecha_inicio: Option<String>,
    /// Upper bound (RFC 3339).
    pub fecha_fin: Option<String>,
    /// Actor filter.
    pub usuario: Option<String>,
    /// Role filter.
    pub rol: Option<String>,
    /// Action filter.
    pub accion: Option<String>,
    /// Outcome filter.
    pub estado: Option<String>,
    /// Page number.
    pub pagina: Option<String>,
    /// Page size.
    pub limite: Option<String>,
}

impl AuditQueryParams {
    /// Returns true when any filter, as opposed to paging, is present.
    #[must_use]
    pub fn has_filters(&self) -> bool {
        [
            &self.fecha_inicio,
            &self.fecha_fin,
            &self.usuario,
            &self.rol,
            &self.accion,
            &self.estado,
        ]
        .into_iter()
        .any(|value| value.as_deref().is_some_and(|text| !text.trim().is_empty()))
    }

    /// Validates the parameters into an [`AuditQuery`].
    ///
    /// # Errors
    ///
    /// Returns [`LabError::Validation`] for malformed dates, outcomes, or page
    /// numbers.
    pub fn into_query(self) -> Result<AuditQuery, LabError> {
        let page = parse_positive("pagina", self.pagina.as_deref(), 1)?;
        let limit = parse_positive("limite", self.limite.as_deref(), DEFAULT_PAGE_LIMIT)?;
        if limit > MAX_PAGE_LIMIT {
            return Err(LabError::validation(format!("limite must be at most {MAX_PAGE_LIMIT}")));
        }
        let from = parse_bound("fechaInicio", self.fecha_inicio.as_deref())?;
        let to = parse_bound("fechaFin", self.fecha_fin.as_deref())?;
        if let (Some(from), Some(to)) = (from, to)
            && from > to
        {
            return Err(LabError::validation("fechaInicio must not be after fechaFin"));
        }
        let outcome = match non_blank(self.estado) {
            None => None,
            Some(raw) => Some(AuditOutcome::parse(&raw).ok_or_else(|| {
                LabError::validation("estado must be one of: exitoso, fallido")
            })?),
        };
        Ok(AuditQuery {
            from,
            to,
            user: non_blank(self.usuario),
            role: non_blank(self.rol),
            action: non_blank(self.accion),
            outcome,
            page,
            limit,
        })
    }
}

impl AuditQuery {
    /// Returns true when `record` satisfies every filter.
    #[must_use]
    pub fn matches(&self, record: &AuditRecord) -> bool {
        if self.from.is_some_and(|from| record.fecha < from)
            || self.to.is_some_and(|to| record.fecha > to)
        {
            return false;
        }
        if let Some(user) = &self.user {
            let actor = &record.usuario;
            let matched = [&actor.id, &actor.documento, &actor.nombre]
                .into_iter()
                .any(|value| value.eq_ignore_ascii_case(user));
            if !matched {
                return false;
            }
        }
        if let Some(role) = &self.role
            && !record.usuario.rol.eq_ignore_ascii_case(role)
        {
            return false;
        }
        if let Some(action) = &self.action
            && !record.accion.tipo.eq_ignore_ascii_case(action)
            && !record.accion.ruta.contains(action.as_str())
        {
            return false;
        }
        self.outcome.is_none_or(|outcome| record.estado == outcome)
    }

    /// Returns the number of records to skip.
    #[must_use]
    pub fn offset(&self) -> u64 {
        u64::from(self.page.saturating_sub(1)) * u64::from(self.limit)
    }
}

/// One page of audit records, newest first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditPage {
    /// Records on this page.
    pub registros: Vec<AuditRecord>,
    /// Total matching records.
    pub total: u64,
    /// Page number.
    pub pagina: u32,
    /// Page size.
    pub limite: u32,
    /// Number of pages.
    #[serde(rename = "totalPaginas")]
    pub total_pages: u64,
}

impl AuditPage {
    /// Builds a page from the matching slice and total count.
    #[must_use]
    pub fn new(records: Vec<AuditRecord>, total: u64, query: &AuditQuery) -> Self {
        let limit = u64::from(query.limit.max(1));
        Self {
            registros: records,
            total,
            pagina: query.page,
            limite: query.limit,
            total_pages: total.div_ceil(limit),
        }
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Drops blank strings.
fn non_blank(value: Option<String>) -> Option<String> {
    value.map(|text| text.trim().to_string()).filter(|text| !text.is_empty())
}

/// Parses a positive page parameter.
fn parse_positive(field: &str, raw: Option<&str>, default: u32) -> Result<u32, LabError> {
    match raw.map(str::trim).filter(|text| !text.is_empty()) {
        None => Ok(default),
        Some(text) => match text.parse::<u32>() {
            Ok(value) if value >= 1 => Ok(value),
            _ => Err(LabError::validation(format!("{field} must be a positive integer"))),
        },
    }
}

/// Parses an RFC 3339 date bound; a bare date covers the whole day.
fn parse_bound(field: &str, raw: Option<&str>) -> Result<Option<Timestamp>, LabError> {
    let Some(text) = raw.map(str::trim).filter(|text| !text.is_empty()) else {
        return Ok(None);
    };
    let parsed = if text.len() == 10 {
        let suffix = if field == "fechaFin" { "T23:59:59.999Z" } else { "T00:00:00Z" };
        Timestamp::parse_rfc3339(&format!("{text}{suffix}"))
    } else {
        Timestamp::parse_rfc3339(text)
    };
    parsed
        .map(Some)
        .map_err(|_| LabError::validation(format!("{field} must be an RFC 3339 date or timestamp")))
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    #![allow(
        clippy::unwrap_used,
        clippy::expect_used,
        reason = "Test-only assertions are permitted."
    )]

    use super::*;

    #[test]
    fn outcome_follows_status_threshold() {
        assert_eq!(AuditOutcome::from_status(200), AuditOutcome::Exitoso);
        assert_eq!(AuditOutcome::from_status(399), AuditOutcome::Exitoso);
        assert_eq!(AuditOutcome::from_status(400), AuditOutcome::Fallido);
        assert_eq!(AuditOutcome::from_status(500), AuditOutcome::Fallido);
    }

    #[test]
    fn params_default_to_first_page_of_ten() {
        let query = AuditQueryParams::default().into_query().unwrap();
        assert_eq!((query.page, query.limit), (1, DEFAULT_PAGE_LIMIT));
        assert_eq!(query.offset(), 0);
    }

    #[test]
    fn bare_dates_cover_whole_days() {
        let params = AuditQueryParams {
            fecha_inicio: Some("2024-03-01".to_string()),
            fecha_fin: Some("2024-03-01".to_string()),
            ..AuditQueryParams::default()
        };
        let query = params.into_query().unwrap();
        let span = query.to.unwrap().as_unix_millis() - query.from.unwrap().as_unix_millis();
        assert_eq!(span, 86_399_999);
    }

    #[test]
    fn malformed_params_are_rejected() {
        let bad_page = AuditQueryParams {
            pagina: Some("0".to_string()),
            ..AuditQueryParams::default()
        };
        assert!(bad_page.into_query().is_err());
        let bad_outcome = AuditQueryParams {
            estado: Some("pendiente".to_string()),
            ..AuditQueryParams::default()
        };
        assert!(bad_outcome.into_query().is_err());
    }
}
