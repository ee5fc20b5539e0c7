// crates/aqualab-core/src/core/sample.rs
// ============================================================================
// Module: AquaLab Sample Model
// Description: Water sample entity, signatures, state machine, and history.
// Purpose: Hold the sample invariants that do not depend on storage.
// Dependencies: serde, serde_json, base64
// ============================================================================

//! ## Overview
//! A [`Sample`] moves through `Recibida -> En análisis -> Verificada`. Each
//! transition appends exactly one [`SampleHistoryEntry`]; no transition skips
//! or reverses a state, and entering analysis requires both signatures.
//! Descriptive fields the laboratory submits beyond the modeled ones are kept
//! verbatim in [`Sample::details`].

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use serde::Deserialize;
use serde::Serialize;
use serde_json::Map;
use serde_json::Value;

use crate::core::error::LabError;
use crate::core::identifiers::RecordId;
use crate::core::identifiers::SampleId;
use crate::core::identity::Actor;
use crate::core::time::Timestamp;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Maximum decoded size of a signature image.
pub const MAX_SIGNATURE_BYTES: usize = 2 * 1024 * 1024;
/// Field names owned by the lifecycle; clients may not write them.
pub const LIFECYCLE_FIELDS: &[&str] = &[
    "_id",
    "idMuestra",
    "estado",
    "historial",
    "firmas",
    "creadoPor",
    "createdAt",
    "updatedAt",
];
/// Field names the server fills in and silently drops from client payloads.
const SERVER_STAMPED_FIELDS: &[&str] = &["actualizadoPor"];

// ============================================================================
// SECTION: State Machine
// ============================================================================

/// Sample lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SampleState {
    /// Received and signed; awaiting results.
    #[serde(rename = "Recibida")]
    Recibida,
    /// Results registered; awaiting verification.
    #[serde(rename = "En análisis")]
    EnAnalisis,
    /// Results verified. Terminal.
    #[serde(rename = "Verificada")]
    Verificada,
}

impl SampleState {
    /// Every valid state label.
    pub const ALL: [Self; 3] = [Self::Recibida, Self::EnAnalisis, Self::Verificada];

    /// Returns the wire label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Recibida => "Recibida",
            Self::EnAnalisis => "En análisis",
            Self::Verificada => "Verificada",
        }
    }

    /// Parses an exact state label.
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|state| state.as_str() == raw)
    }

    /// Returns the only legal successor state.
    #[must_use]
    pub const fn next(self) -> Option<Self> {
        match self {
            Self::Recibida => Some(Self::EnAnalisis),
            Self::EnAnalisis => Some(Self::Verificada),
            Self::Verificada => None,
        }
    }
}

impl fmt::Display for SampleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// SECTION: Signatures
// ============================================================================

/// Signer slot on a sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignatureSlot {
    /// Administrator who received the sample.
    Administrador,
    /// Client who submitted the sample.
    Cliente,
}

impl SignatureSlot {
    /// Returns the label used in error messages.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Administrador => "administrator",
            Self::Cliente => "client",
        }
    }
}

/// Stored signature block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignatureBlock {
    /// Signer document number.
    #[serde(rename = "documento")]
    pub document: String,
    /// Signer display name.
    #[serde(rename = "nombre", default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Base64 signature image, optionally prefixed as a data URL.
    #[serde(rename = "firma")]
    pub signature: String,
    /// Signing time.
    #[serde(rename = "fechaFirma")]
    pub signed_at: Timestamp,
}

/// Signatures attached to a sample.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signatures {
    /// Administrator signature.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub administrador: Option<SignatureBlock>,
    /// Client signature.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cliente: Option<SignatureBlock>,
}

impl Signatures {
    /// Returns true when both required signatures are present.
    #[must_use]
    pub const fn is_complete(&self) -> bool {
        self.administrador.is_some() && self.cliente.is_some()
    }

    /// Stores a signature in the given slot, replacing any previous one.
    pub fn set(&mut self, slot: SignatureSlot, block: SignatureBlock) {
        match slot {
            SignatureSlot::Administrador => self.administrador = Some(block),
            SignatureSlot::Cliente => self.cliente = Some(block),
        }
    }
}

/// Validates a submitted signature image.
///
/// An optional `data:<mime>;base64,` prefix is stripped; the remainder must be
/// standard base64 decoding to at most [`MAX_SIGNATURE_BYTES`].
///
/// # Errors
///
/// Returns [`LabError::Validation`] naming the signer when the signature is
/// empty, not base64, or too large.
pub fn validate_signature(slot: SignatureSlot, raw: &str) -> Result<(), LabError> {
    let signer = slot.label();
    let payload = raw.split_once(',').map_or(raw, |(_, data)| data).trim();
    if payload.is_empty() {
        return Err(LabError::validation(format!("{signer} signature is required")));
    }
    let too_large = || {
        LabError::validation(format!(
            "{signer} signature exceeds the maximum size of {MAX_SIGNATURE_BYTES} bytes"
        ))
    };
    if payload.len() / 4 * 3 > MAX_SIGNATURE_BYTES + 3 {
        return Err(too_large());
    }
    let decoded = STANDARD.decode(payload).map_err(|_| {
        LabError::validation(format!("{signer} signature must be valid base64"))
    })?;
    if decoded.len() > MAX_SIGNATURE_BYTES {
        return Err(too_large());
    }
    Ok(())
}

/// Signature payload submitted with a new sample.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SignatureInput {
    /// Administrator signature.
    #[serde(rename = "firmaAdministrador", default)]
    pub administrator: Option<SignaturePayload>,
    /// Client signature.
    #[serde(rename = "firmaCliente", default)]
    pub client: Option<SignaturePayload>,
}

/// Single submitted signature.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SignaturePayload {
    /// Base64 image.
    #[serde(default)]
    pub firma: Option<String>,
}

/// Signature registered on an existing sample.
#[derive(Debug, Clone, Deserialize)]
pub struct SignatureSubmission {
    /// Slot being signed.
    pub tipo: SignatureSlot,
    /// Base64 image.
    pub firma: String,
}

// ============================================================================
// SECTION: Sample
// ============================================================================

/// Water type descriptor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WaterType {
    /// Water type label (for example `potable` or `residual`).
    pub tipo: String,
    /// Additional descriptor fields.
    #[serde(flatten)]
    pub details: Map<String, Value>,
}

/// One sample state transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SampleHistoryEntry {
    /// State entered.
    pub estado: SampleState,
    /// Acting user's document.
    pub documento: String,
    /// Acting user's name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nombre: Option<String>,
    /// Transition time.
    #[serde(rename = "fechaCambio")]
    pub changed_at: Timestamp,
    /// Free-text note.
    pub observaciones: String,
}

/// One non-transition modification of a sample.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateStamp {
    /// Acting user's document.
    pub documento: String,
    /// Acting user's name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nombre: Option<String>,
    /// Modification time.
    pub fecha: Timestamp,
    /// What was changed.
    pub accion: String,
}

/// Persisted water sample.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    /// Internal identifier.
    #[serde(rename = "_id")]
    pub id: RecordId,
    /// Business key.
    #[serde(rename = "idMuestra")]
    pub sample_id: SampleId,
    /// Submitting client's document.
    #[serde(rename = "documento")]
    pub client_document: String,
    /// Sampling time.
    #[serde(rename = "fechaHora")]
    pub sampled_at: Timestamp,
    /// Water type.
    #[serde(rename = "tipoDeAgua")]
    pub water_type: WaterType,
    /// Sampling method.
    #[serde(rename = "tipoMuestreo", default, skip_serializing_if = "Option::is_none")]
    pub sampling_type: Option<String>,
    /// Signature block.
    #[serde(rename = "firmas")]
    pub signatures: Signatures,
    /// Current state.
    #[serde(rename = "estado")]
    pub state: SampleState,
    /// Append-only transition log.
    #[serde(rename = "historial")]
    pub history: Vec<SampleHistoryEntry>,
    /// Creating user identifier.
    #[serde(rename = "creadoPor")]
    pub created_by: String,
    /// Append-only modification log.
    #[serde(rename = "actualizadoPor", default)]
    pub updates: Vec<UpdateStamp>,
    /// Creation time.
    #[serde(rename = "createdAt")]
    pub created_at: Timestamp,
    /// Last modification time.
    #[serde(rename = "updatedAt")]
    pub updated_at: Timestamp,
    /// Additional descriptive fields.
    #[serde(flatten)]
    pub details: Map<String, Value>,
}

impl Sample {
    /// Moves the sample to `target`, appending one history entry.
    ///
    /// # Errors
    ///
    /// Returns [`LabError::Validation`] when `target` is not the immediate
    /// successor of the current state, or when entering analysis without both
    /// signatures.
    pub fn advance(
        &mut self,
        target: SampleState,
        actor: &Actor,
        note: &str,
        now: Timestamp,
    ) -> Result<(), LabError> {
        if self.state.next() != Some(target) {
            return Err(LabError::validation(format!(
                "sample {} cannot move from {} to {}",
                self.sample_id, self.state, target
            )));
        }
        if target == SampleState::EnAnalisis && !self.signatures.is_complete() {
            return Err(LabError::validation(format!(
                "sample {} requires administrator and client signatures before analysis",
                self.sample_id
            )));
        }
        self.state = target;
        self.history.push(SampleHistoryEntry {
            estado: target,
            documento: actor.document.clone(),
            nombre: actor.name.clone(),
            changed_at: now,
            observaciones: note.to_string(),
        });
        self.updated_at = now;
        Ok(())
    }

    /// Records a non-transition modification.
    pub fn stamp_update(&mut self, actor: &Actor, action: impl Into<String>, now: Timestamp) {
        self.updates.push(UpdateStamp {
            documento: actor.document.clone(),
            nombre: actor.name.clone(),
            fecha: now,
            accion: action.into(),
        });
        self.updated_at = now;
    }

    /// Applies a descriptive-field patch. Returns the changed field names.
    ///
    /// # Errors
    ///
    /// Returns [`LabError::Validation`] when the patch touches a lifecycle
    /// field or carries a malformed value.
    pub fn apply_update(&mut self, patch: &SampleUpdate) -> Result<Vec<String>, LabError> {
        let mut changed = Vec::new();
        for (field, value) in &patch.0 {
            if LIFECYCLE_FIELDS.contains(&field.as_str()) {
                return Err(LabError::validation(format!(
                    "field {field} is managed by the sample lifecycle and cannot be updated"
                )));
            }
            if SERVER_STAMPED_FIELDS.contains(&field.as_str()) {
                continue;
            }
            let did_change = match field.as_str() {
                "documento" => {
                    let document = required_string(field, value)?;
                    replace_if_changed(&mut self.client_document, document)
                }
                "fechaHora" => {
                    let sampled_at: Timestamp = parse_field(field, value)?;
                    replace_if_changed(&mut self.sampled_at, sampled_at)
                }
                "tipoDeAgua" => {
                    let water_type: WaterType = parse_field(field, value)?;
                    replace_if_changed(&mut self.water_type, water_type)
                }
                "tipoMuestreo" => {
                    let sampling_type: Option<String> = parse_field(field, value)?;
                    replace_if_changed(&mut self.sampling_type, sampling_type)
                }
                _ if value.is_null() => self.details.remove(field).is_some(),
                _ => {
                    let previous = self.details.insert(field.clone(), value.clone());
                    previous.as_ref() != Some(value)
                }
            };
            if did_change {
                changed.push(field.clone());
            }
        }
        Ok(changed)
    }
}

/// Raw JSON patch for a sample's descriptive fields.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(transparent)]
pub struct SampleUpdate(pub Map<String, Value>);

impl SampleUpdate {
    /// Returns true when the patch names no writable field.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.keys().all(|key| SERVER_STAMPED_FIELDS.contains(&key.as_str()))
    }
}

/// Payload for registering a new sample.
#[derive(Debug, Clone, Deserialize)]
pub struct NewSample {
    /// Business key.
    #[serde(rename = "idMuestra", default)]
    pub sample_id: String,
    /// Client document.
    #[serde(rename = "documento", default)]
    pub client_document: String,
    /// Sampling time; defaults to the registration time.
    #[serde(rename = "fechaHora", default)]
    pub sampled_at: Option<Timestamp>,
    /// Water type.
    #[serde(rename = "tipoDeAgua")]
    pub water_type: WaterType,
    /// Sampling method.
    #[serde(rename = "tipoMuestreo", default)]
    pub sampling_type: Option<String>,
    /// Submitted signatures.
    #[serde(default)]
    pub firmas: Option<SignatureInput>,
    /// Additional descriptive fields.
    #[serde(flatten)]
    pub details: Map<String, Value>,
}

impl NewSample {
    /// Returns descriptive fields with lifecycle and server-owned keys removed.
    #[must_use]
    pub fn descriptive_details(&self) -> Map<String, Value> {
        self.details
            .iter()
            .filter(|(key, _)| {
                !LIFECYCLE_FIELDS.contains(&key.as_str())
                    && !SERVER_STAMPED_FIELDS.contains(&key.as_str())
            })
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect()
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Replaces `slot` with `value` and reports whether it differed.
fn replace_if_changed<T: PartialEq>(slot: &mut T, value: T) -> bool {
    if *slot == value {
        return false;
    }
    *slot = value;
    true
}

/// Reads a non-empty string field.
fn required_string(field: &str, value: &Value) -> Result<String, LabError> {
    match value.as_str().map(str::trim) {
        Some(text) if !text.is_empty() => Ok(text.to_string()),
        _ => Err(LabError::validation(format!("field {field} must be a non-empty string"))),
    }
}

/// Deserializes a typed field from a patch value.
fn parse_field<T: serde::de::DeserializeOwned>(field: &str, value: &Value) -> Result<T, LabError> {
    serde_json::from_value(value.clone())
        .map_err(|err| LabError::validation(format!("field {field} is invalid: {err}")))
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

    use serde_json::json;

    use super::*;

    #[test]
    fn signature_accepts_data_url_prefix() {
        validate_signature(SignatureSlot::Cliente, "data:image/png;base64,aGVsbG8=").unwrap();
        validate_signature(SignatureSlot::Cliente, "aGVsbG8=").unwrap();
    }

    #[test]
    fn signature_rejects_empty_and_malformed() {
        let empty = validate_signature(SignatureSlot::Administrador, "data:image/png;base64,");
        assert!(matches!(empty, Err(LabError::Validation(message)) if message.contains("administrator")));
        let malformed = validate_signature(SignatureSlot::Cliente, "not base64!!");
        assert!(matches!(malformed, Err(LabError::Validation(message)) if message.contains("base64")));
    }

    #[test]
    fn signature_rejects_oversized_payload() {
        let oversized = STANDARD.encode(vec![0_u8; MAX_SIGNATURE_BYTES + 1]);
        assert!(validate_signature(SignatureSlot::Cliente, &oversized).is_err());
        let at_limit = STANDARD.encode(vec![0_u8; MAX_SIGNATURE_BYTES]);
        validate_signature(SignatureSlot::Cliente, &at_limit).unwrap();
    }

    #[test]
    fn state_labels_round_trip() {
        for state in SampleState::ALL {
            assert_eq!(SampleState::parse(state.as_str()), Some(state));
            let encoded = serde_json::to_value(state).unwrap();
            assert_eq!(encoded, json!(state.as_str()));
        }
        assert_eq!(SampleState::parse("Finalizada"), None);
        assert_eq!(SampleState::Verificada.next(), None);
    }
}
