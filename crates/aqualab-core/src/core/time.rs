// crates/aqualab-core/src/core/time.rs
// ============================================================================
// Module: AquaLab Time Model
// Description: Canonical timestamp used by entities, history, and audit logs.
// Purpose: Keep timestamps explicit so lifecycle operations stay replayable.
// Dependencies: serde, time
// ============================================================================

//! ## Overview
//! Timestamps are unix milliseconds internally and RFC 3339 strings on the
//! wire. The core never reads wall-clock time; hosts supply `now` to every
//! mutating operation.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;

use ::time::OffsetDateTime;
use ::time::format_description::well_known::Rfc3339;
use serde::Deserialize;
use serde::Deserializer;
use serde::Serialize;
use serde::Serializer;
use serde::de;

// ============================================================================
// SECTION: Time Values
// ============================================================================

/// Unix-millisecond timestamp rendered as RFC 3339 in JSON.
///
/// # Invariants
/// - Values are explicitly provided by callers; the core never reads the clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Timestamp(i64);

impl Timestamp {
    /// Creates a timestamp from unix milliseconds.
    #[must_use]
    pub const fn from_unix_millis(millis: i64) -> Self {
        Self(millis)
    }

    /// Returns the timestamp as unix milliseconds.
    #[must_use]
    pub const fn as_unix_millis(self) -> i64 {
        self.0
    }

    /// Parses an RFC 3339 timestamp.
    ///
    /// # Errors
    ///
    /// Returns a message when the value is not valid RFC 3339 or falls outside
    /// the representable range.
    pub fn parse_rfc3339(value: &str) -> Result<Self, String> {
        let parsed = OffsetDateTime::parse(value.trim(), &Rfc3339)
            .map_err(|err| format!("invalid rfc3339 timestamp: {err}"))?;
        let millis = parsed.unix_timestamp_nanos() / 1_000_000;
        i64::try_from(millis).map(Self).map_err(|_| "timestamp out of range".to_string())
    }

    /// Renders the timestamp as RFC 3339 (UTC).
    ///
    /// Falls back to the raw millisecond count when the value cannot be
    /// represented as a calendar date.
    #[must_use]
    pub fn to_rfc3339(self) -> String {
        let nanos = i128::from(self.0) * 1_000_000;
        OffsetDateTime::from_unix_timestamp_nanos(nanos)
            .ok()
            .and_then(|value| value.format(&Rfc3339).ok())
            .unwrap_or_else(|| self.0.to_string())
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_rfc3339())
    }
}

impl Serialize for Timestamp {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_rfc3339())
    }
}

impl<'de> Deserialize<'de> for Timestamp {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(TimestampVisitor)
    }
}

/// Accepts RFC 3339 strings or integer unix milliseconds.
struct TimestampVisitor;

impl de::Visitor<'_> for TimestampVisitor {
    type Value = Timestamp;

    fn expecting(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str("an RFC 3339 timestamp or unix milliseconds")
    }

    fn visit_str<E: de::Error>(self, value: &str) -> Result<Self::Value, E> {
        Timestamp::parse_rfc3339(value).map_err(E::custom)
    }

    fn visit_i64<E: de::Error>(self, value: i64) -> Result<Self::Value, E> {
        Ok(Timestamp(value))
    }

    fn visit_u64<E: de::Error>(self, value: u64) -> Result<Self::Value, E> {
        i64::try_from(value).map(Timestamp).map_err(|_| E::custom("timestamp out of range"))
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================
