// crates/aqualab-core/src/core/error.rs
// ============================================================================
// Module: AquaLab Errors
// Description: Error kinds raised by domain guards and lifecycle managers.
// Purpose: Give hosts one error type to translate into transport responses.
// Dependencies: thiserror
// ============================================================================

//! ## Overview
//! Every guard in the core fails with one of four kinds: validation,
//! not-found, authentication, or authorization. Storage failures are carried
//! through unchanged so hosts can report them as internal errors.

// ============================================================================
// SECTION: Imports
// ============================================================================

use thiserror::Error;

use crate::interfaces::StoreError;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Domain error raised by AquaLab guards and lifecycle managers.
#[derive(Debug, Error)]
pub enum LabError {
    /// Malformed input or a violated precondition.
    #[error("{0}")]
    Validation(String),
    /// The addressed entity does not exist.
    #[error("{0}")]
    NotFound(String),
    /// Missing, invalid, or expired credentials.
    #[error("{0}")]
    Authentication(String),
    /// Authenticated caller lacks the required permission or ownership.
    #[error("{0}")]
    Authorization(String),
    /// Storage backend failure.
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl LabError {
    /// Builds a validation error.
    #[must_use]
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Builds a not-found error.
    #[must_use]
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    /// Builds an authorization error.
    #[must_use]
    pub fn authorization(message: impl Into<String>) -> Self {
        Self::Authorization(message.into())
    }

    /// Returns a stable label for logs and error codes.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation",
            Self::NotFound(_) => "not_found",
            Self::Authentication(_) => "authentication",
            Self::Authorization(_) => "authorization",
            Self::Store(_) => "store",
        }
    }
}
