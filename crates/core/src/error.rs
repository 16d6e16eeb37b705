//! Core error model.

use thiserror::Error;

/// Result type used across the core value types.
pub type CoreResult<T> = Result<T, CoreError>;

/// Core-level error.
///
/// Only deterministic, local failures live here (validation, parsing).
/// Worker and transport failures are reported as outcomes, not errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CoreError {
    /// A value failed validation (e.g. a zero-sized grid).
    #[error("validation failed: {0}")]
    Validation(String),

    /// An identifier was invalid (e.g. parse failure).
    #[error("invalid identifier: {0}")]
    InvalidId(String),
}

impl CoreError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn invalid_id(msg: impl Into<String>) -> Self {
        Self::InvalidId(msg.into())
    }
}
