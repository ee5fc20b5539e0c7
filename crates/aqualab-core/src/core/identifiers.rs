// crates/aqualab-core/src/core/identifiers.rs
// ============================================================================
// Module: AquaLab Identifiers
// Description: Sample business keys and internal record identifiers.
// Purpose: Keep identifier normalization in one place.
// Dependencies: serde, rand
// ============================================================================

//! ## Overview
//! Two identifiers address a sample. [`SampleId`] is the laboratory's business
//! key (`idMuestra`), matched case-insensitively everywhere. [`RecordId`] is
//! the internal storage id: 24 lowercase hex characters whose first four bytes
//! carry the creation second.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;
use std::fmt::Write as _;

use serde::Deserialize;
use serde::Serialize;

use crate::core::time::Timestamp;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Number of raw bytes in a record identifier.
const RECORD_ID_BYTES: usize = 12;
/// Length of the hex rendering of a record identifier.
pub const RECORD_ID_LEN: usize = RECORD_ID_BYTES * 2;

// ============================================================================
// SECTION: Sample Identifier
// ============================================================================

/// Sample business key (`idMuestra`).
///
/// # Invariants
/// - Stored trimmed; original casing is preserved for display.
/// - Equality and lookups go through [`SampleId::key`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SampleId(String);

impl SampleId {
    /// Creates a sample identifier, trimming surrounding whitespace.
    #[must_use]
    pub fn new(id: impl AsRef<str>) -> Self {
        Self(id.as_ref().trim().to_string())
    }

    /// Returns the identifier as entered.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the case-folded lookup key.
    #[must_use]
    pub fn key(&self) -> String {
        self.0.to_lowercase()
    }

    /// Returns true when the identifier is empty after trimming.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl PartialEq for SampleId {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl Eq for SampleId {}

impl fmt::Display for SampleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<&str> for SampleId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

// ============================================================================
// SECTION: Record Identifier
// ============================================================================

/// Internal storage identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(String);

impl RecordId {
    /// Generates a fresh identifier stamped with the creation time.
    #[must_use]
    pub fn generate(now: Timestamp) -> Self {
        let seconds = u32::try_from(now.as_unix_millis().div_euclid(1000)).unwrap_or(u32::MAX);
        let mut bytes = [0_u8; RECORD_ID_BYTES];
        bytes[.. 4].copy_from_slice(&seconds.to_be_bytes());
        let tail: [u8; 8] = rand::random();
        bytes[4 ..].copy_from_slice(&tail);
        let mut rendered = String::with_capacity(RECORD_ID_LEN);
        for byte in bytes {
            let _ = write!(rendered, "{byte:02x}");
        }
        Self(rendered)
    }

    /// Parses a well-formed identifier: exactly 24 hex characters.
    ///
    /// Uppercase input is accepted and normalized to lowercase.
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        if raw.len() != RECORD_ID_LEN || !raw.bytes().all(|byte| byte.is_ascii_hexdigit()) {
            return None;
        }
        Some(Self(raw.to_ascii_lowercase()))
    }

    /// Returns the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
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

    use super::*;

    #[test]
    fn sample_ids_compare_case_insensitively() {
        assert_eq!(SampleId::new("  MA-001 "), SampleId::new("ma-001"));
        assert_eq!(SampleId::new(" MA-001 ").as_str(), "MA-001");
    }

    #[test]
    fn generated_record_ids_parse_back() {
        let id = RecordId::generate(Timestamp::from_unix_millis(1_700_000_000_000));
        assert_eq!(id.as_str().len(), RECORD_ID_LEN);
        assert_eq!(RecordId::parse(id.as_str()), Some(id.clone()));
        assert!(id.as_str().starts_with("6553f100"));
    }

    #[test]
    fn malformed_record_ids_are_rejected() {
        assert!(RecordId::parse("not-an-id").is_none());
        assert!(RecordId::parse("6553f100zz00000000000000").is_none());
        assert!(RecordId::parse("6553f10000000000000000").is_none());
        assert!(RecordId::parse("6553F1000000000000000000").is_some());
    }
}
