// crates/aqualab-core/src/core/result.rs
// ============================================================================
// Module: AquaLab Result Model
// Description: Lab result entity, measured parameters, and numeric validation.
// Purpose: Hold the result invariants that do not depend on storage.
// Dependencies: serde, serde_json
// ============================================================================

//! ## Overview
//! A [`LabResult`] belongs to exactly one sample and carries up to six
//! measured [`Parameter`]s. Values arrive as JSON numbers or numeric strings
//! and are range-checked before they touch the entity: pH must lie in
//! `[0, 14]`, every other parameter must be non-negative.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

use crate::core::error::LabError;
use crate::core::identifiers::RecordId;
use crate::core::identifiers::SampleId;
use crate::core::identity::Actor;
use crate::core::time::Timestamp;

// ============================================================================
// SECTION: Parameters
// ============================================================================

/// Measured water-quality parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Parameter {
    /// Acidity.
    Ph,
    /// Turbidity.
    Turbidez,
    /// Dissolved oxygen.
    OxigenoDisuelto,
    /// Nitrates.
    Nitratos,
    /// Suspended solids.
    SolidosSuspendidos,
    /// Phosphates.
    Fosfatos,
}

impl Parameter {
    /// Every parameter, in report order.
    pub const ALL: [Self; 6] = [
        Self::Ph,
        Self::Turbidez,
        Self::OxigenoDisuelto,
        Self::Nitratos,
        Self::SolidosSuspendidos,
        Self::Fosfatos,
    ];

    /// Returns the JSON field name.
    #[must_use]
    pub const fn field(self) -> &'static str {
        match self {
            Self::Ph => "pH",
            Self::Turbidez => "turbidez",
            Self::OxigenoDisuelto => "oxigenoDisuelto",
            Self::Nitratos => "nitratos",
            Self::SolidosSuspendidos => "solidosSuspendidos",
            Self::Fosfatos => "fosfatos",
        }
    }

    /// Returns the unit applied when none is stored.
    #[must_use]
    pub const fn default_unit(self) -> &'static str {
        match self {
            Self::Turbidez => "NTU",
            _ => "mg/L",
        }
    }

    /// Checks a parsed value against the parameter's range.
    ///
    /// # Errors
    ///
    /// Returns [`LabError::Validation`] naming the field when the value is not
    /// finite or out of range.
    pub fn check(self, value: f64) -> Result<f64, LabError> {
        if !value.is_finite() {
            return Err(LabError::validation(format!("value of {self} must be a finite number")));
        }
        match self {
            Self::Ph if !(0.0 ..= 14.0).contains(&value) => {
                Err(LabError::validation("pH must be between 0 and 14"))
            }
            _ if value < 0.0 => {
                Err(LabError::validation(format!("value of {self} cannot be negative")))
            }
            _ => Ok(value),
        }
    }

    /// Parses a raw JSON value and checks its range.
    ///
    /// `null` and blank strings mean "not provided" and yield `None`.
    ///
    /// # Errors
    ///
    /// Returns [`LabError::Validation`] naming the field when the value is not
    /// numeric or out of range.
    pub fn parse(self, raw: &Value) -> Result<Option<f64>, LabError> {
        let value = match raw {
            Value::Null => return Ok(None),
            Value::Number(number) => number.as_f64(),
            Value::String(text) if text.trim().is_empty() => return Ok(None),
            Value::String(text) => text.trim().parse::<f64>().ok(),
            _ => None,
        };
        let Some(value) = value else {
            return Err(LabError::validation(format!("value of {self} must be numeric")));
        };
        self.check(value).map(Some)
    }
}

impl fmt::Display for Parameter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.field())
    }
}

// ============================================================================
// SECTION: Measurements
// ============================================================================

/// Stored measurement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Measurement {
    /// Measured value.
    pub valor: f64,
    /// Unit of measure.
    pub unidad: String,
}

/// The six optional measurements of a result.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Measurements {
    /// pH.
    #[serde(rename = "pH", default, skip_serializing_if = "Option::is_none")]
    pub ph: Option<Measurement>,
    /// Turbidity.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub turbidez: Option<Measurement>,
    /// Dissolved oxygen.
    #[serde(rename = "oxigenoDisuelto", default, skip_serializing_if = "Option::is_none")]
    pub oxigeno_disuelto: Option<Measurement>,
    /// Nitrates.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nitratos: Option<Measurement>,
    /// Suspended solids.
    #[serde(rename = "solidosSuspendidos", default, skip_serializing_if = "Option::is_none")]
    pub solidos_suspendidos: Option<Measurement>,
    /// Phosphates.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fosfatos: Option<Measurement>,
}

impl Measurements {
    /// Returns the measurement for `parameter`.
    #[must_use]
    pub const fn get(&self, parameter: Parameter) -> Option<&Measurement> {
        self.slot(parameter).as_ref()
    }

    /// Returns true when no parameter carries a value.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        Parameter::ALL.into_iter().all(|parameter| self.get(parameter).is_none())
    }

    /// Borrows the storage slot for `parameter`.
    const fn slot(&self, parameter: Parameter) -> &Option<Measurement> {
        match parameter {
            Parameter::Ph => &self.ph,
            Parameter::Turbidez => &self.turbidez,
            Parameter::OxigenoDisuelto => &self.oxigeno_disuelto,
            Parameter::Nitratos => &self.nitratos,
            Parameter::SolidosSuspendidos => &self.solidos_suspendidos,
            Parameter::Fosfatos => &self.fosfatos,
        }
    }

    /// Mutably borrows the storage slot for `parameter`.
    const fn slot_mut(&mut self, parameter: Parameter) -> &mut Option<Measurement> {
        match parameter {
            Parameter::Ph => &mut self.ph,
            Parameter::Turbidez => &mut self.turbidez,
            Parameter::OxigenoDisuelto => &mut self.oxigeno_disuelto,
            Parameter::Nitratos => &mut self.nitratos,
            Parameter::SolidosSuspendidos => &mut self.solidos_suspendidos,
            Parameter::Fosfatos => &mut self.fosfatos,
        }
    }

    /// Writes `value` for `parameter` if it differs from the stored value.
    ///
    /// The stored unit is kept; a missing unit falls back to the submitted
    /// one, then to the parameter default. Returns true when anything changed.
    pub fn merge(&mut self, parameter: Parameter, value: f64, unit: Option<&str>) -> bool {
        let slot = self.slot_mut(parameter);
        if let Some(existing) = slot.as_ref()
            && (existing.valor - value).abs() <= f64::EPSILON
        {
            return false;
        }
        let unidad = slot
            .as_ref()
            .map(|existing| existing.unidad.clone())
            .or_else(|| unit.map(str::to_string))
            .unwrap_or_else(|| parameter.default_unit().to_string());
        *slot = Some(Measurement {
            valor: value,
            unidad,
        });
        true
    }
}

/// Submitted measurement.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MeasurementInput {
    /// Raw value: number, numeric string, or null.
    #[serde(default)]
    pub valor: Value,
    /// Optional unit override used only when nothing is stored yet.
    #[serde(default)]
    pub unidad: Option<String>,
}

/// Result registration or edit payload.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ResultInput {
    /// pH.
    #[serde(rename = "pH", default)]
    pub ph: Option<MeasurementInput>,
    /// Turbidity.
    #[serde(default)]
    pub turbidez: Option<MeasurementInput>,
    /// Dissolved oxygen.
    #[serde(rename = "oxigenoDisuelto", default)]
    pub oxigeno_disuelto: Option<MeasurementInput>,
    /// Nitrates.
    #[serde(default)]
    pub nitratos: Option<MeasurementInput>,
    /// Suspended solids.
    #[serde(rename = "solidosSuspendidos", default)]
    pub solidos_suspendidos: Option<MeasurementInput>,
    /// Phosphates.
    #[serde(default)]
    pub fosfatos: Option<MeasurementInput>,
    /// Free-text notes.
    #[serde(default)]
    pub observaciones: Option<String>,
}

/// Parsed and range-checked input value.
#[derive(Debug, Clone, PartialEq)]
pub struct CheckedValue {
    /// Parameter measured.
    pub parameter: Parameter,
    /// Value.
    pub value: f64,
    /// Submitted unit, if any.
    pub unit: Option<String>,
}

impl ResultInput {
    /// Returns the submitted entry for `parameter`.
    #[must_use]
    pub const fn entry(&self, parameter: Parameter) -> Option<&MeasurementInput> {
        match parameter {
            Parameter::Ph => self.ph.as_ref(),
            Parameter::Turbidez => self.turbidez.as_ref(),
            Parameter::OxigenoDisuelto => self.oxigeno_disuelto.as_ref(),
            Parameter::Nitratos => self.nitratos.as_ref(),
            Parameter::SolidosSuspendidos => self.solidos_suspendidos.as_ref(),
            Parameter::Fosfatos => self.fosfatos.as_ref(),
        }
    }

    /// Returns true when at least one parameter carries a non-null value.
    ///
    /// Zero counts as a value.
    #[must_use]
    pub fn has_any_value(&self) -> bool {
        Parameter::ALL.into_iter().any(|parameter| {
            self.entry(parameter).is_some_and(|entry| match &entry.valor {
                Value::Null => false,
                Value::String(text) => !text.trim().is_empty(),
                _ => true,
            })
        })
    }

    /// Parses and checks every provided value, in parameter order.
    ///
    /// # Errors
    ///
    /// Returns [`LabError::Validation`] naming the first offending field.
    pub fn checked_values(&self) -> Result<Vec<CheckedValue>, LabError> {
        let mut values = Vec::new();
        for parameter in Parameter::ALL {
            let Some(entry) = self.entry(parameter) else {
                continue;
            };
            if let Some(value) = parameter.parse(&entry.valor)? {
                values.push(CheckedValue {
                    parameter,
                    value,
                    unit: entry.unidad.clone(),
                });
            }
        }
        Ok(values)
    }
}

// ============================================================================
// SECTION: Result Entity
// ============================================================================

/// Kind of change recorded in a result's change log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    /// Initial registration.
    Registro,
    /// Edit by the author.
    Edicion,
    /// Verification by a second technician.
    Verificacion,
}

/// One change-log entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeEntry {
    /// Acting technician's name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nombre: Option<String>,
    /// Acting technician's document.
    pub cedula: String,
    /// Change time.
    pub fecha: Timestamp,
    /// Kind of change.
    pub accion: ChangeKind,
    /// Fields modified by an edit.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub cambios: Vec<String>,
}

impl ChangeEntry {
    /// Builds an entry for `actor`.
    #[must_use]
    pub fn new(actor: &Actor, kind: ChangeKind, now: Timestamp, fields: Vec<String>) -> Self {
        Self {
            nombre: actor.name.clone(),
            cedula: actor.document.clone(),
            fecha: now,
            accion: kind,
            cambios: fields,
        }
    }
}

/// Persisted lab result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabResult {
    /// Internal identifier.
    #[serde(rename = "_id")]
    pub id: RecordId,
    /// Owning sample's business key.
    #[serde(rename = "idMuestra")]
    pub sample_id: SampleId,
    /// Client document copied from the sample.
    #[serde(rename = "documento")]
    pub client_document: String,
    /// Sampling time copied from the sample.
    #[serde(rename = "fechaHora")]
    pub sampled_at: Timestamp,
    /// Sampling method copied from the sample.
    #[serde(rename = "tipoMuestreo", default, skip_serializing_if = "Option::is_none")]
    pub sampling_type: Option<String>,
    /// Measured values.
    #[serde(flatten)]
    pub measurements: Measurements,
    /// Free-text notes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observaciones: Option<String>,
    /// Verification flag. Once set, the result is frozen.
    pub verificado: bool,
    /// Authoring technician's document.
    #[serde(rename = "cedulaLaboratorista")]
    pub author_document: String,
    /// Authoring technician's name.
    #[serde(rename = "nombreLaboratorista", default, skip_serializing_if = "Option::is_none")]
    pub author_name: Option<String>,
    /// Append-only change log.
    #[serde(rename = "historialCambios")]
    pub changes: Vec<ChangeEntry>,
    /// Registration time.
    #[serde(rename = "createdAt")]
    pub created_at: Timestamp,
    /// Last modification time.
    #[serde(rename = "updatedAt")]
    pub updated_at: Timestamp,
}

impl LabResult {
    /// Applies checked values and notes; returns the changed field names.
    pub fn apply_edit(&mut self, values: &[CheckedValue], notes: Option<&str>) -> Vec<String> {
        let mut changed = Vec::new();
        for value in values {
            if self.measurements.merge(value.parameter, value.value, value.unit.as_deref()) {
                changed.push(value.parameter.field().to_string());
            }
        }
        if let Some(notes) = notes
            && self.observaciones.as_deref() != Some(notes)
        {
            self.observaciones = Some(notes.to_string());
            changed.push("observaciones".to_string());
        }
        changed
    }
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
    fn ph_bounds_are_inclusive() {
        for accepted in [0.0, 7.0, 14.0] {
            assert_eq!(Parameter::Ph.check(accepted).unwrap(), accepted);
        }
        for rejected in [-1.0, 15.0, f64::NAN] {
            assert!(Parameter::Ph.check(rejected).is_err());
        }
    }

    #[test]
    fn numeric_strings_are_accepted() {
        assert_eq!(Parameter::Nitratos.parse(&json!(" 2.5 ")).unwrap(), Some(2.5));
        assert_eq!(Parameter::Nitratos.parse(&json!("")).unwrap(), None);
        let err = Parameter::Fosfatos.parse(&json!("abc")).unwrap_err();
        assert!(err.to_string().contains("fosfatos"));
        assert!(Parameter::Fosfatos.parse(&json!(true)).is_err());
    }

    #[test]
    fn merge_keeps_stored_unit_and_defaults_missing_one() {
        let mut measurements = Measurements::default();
        assert!(measurements.merge(Parameter::Turbidez, 1.5, None));
        assert_eq!(measurements.turbidez.as_ref().unwrap().unidad, "NTU");
        assert!(!measurements.merge(Parameter::Turbidez, 1.5, Some("FNU")));
        assert!(measurements.merge(Parameter::Turbidez, 2.0, Some("FNU")));
        assert_eq!(measurements.turbidez.as_ref().unwrap().unidad, "NTU");
        assert!(measurements.merge(Parameter::Ph, 7.0, None));
        assert_eq!(measurements.ph.as_ref().unwrap().unidad, "mg/L");
    }

    #[test]
    fn zero_counts_as_a_value() {
        let input: ResultInput = serde_json::from_value(json!({"turbidez": {"valor": 0}})).unwrap();
        assert!(input.has_any_value());
        let empty: ResultInput = serde_json::from_value(json!({"pH": {"valor": null}})).unwrap();
        assert!(!empty.has_any_value());
    }
}
