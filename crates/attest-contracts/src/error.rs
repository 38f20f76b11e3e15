//! Error taxonomy for the attest ingestion pipeline.
//!
//! All fallible operations return `AttestResult<T>`. Every variant maps to a
//! stable `ErrorKind` so callers (and the HTTP adapter in front of the core)
//! branch on a value, never on a message string.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The unified error type for the attest crates.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AttestError {
    /// A required request field was empty. The caller must fix the request.
    #[error("validation failed: required field '{field}' is empty")]
    Validation { field: String },

    /// A lookup found nothing.
    ///
    /// For `last_by_resource` this is the normal "first record" state rather
    /// than a failure.
    #[error("{what} not found")]
    NotFound { what: String },

    /// An idempotent insert lost a uniqueness race and the winner's record
    /// was still not visible after the single read retry.
    #[error("idempotency conflict on fingerprint {fingerprint} did not resolve; retry the request")]
    TransientConflict { fingerprint: String },

    /// The storage collaborator failed. Propagated as-is.
    #[error("storage unavailable: {reason}")]
    StorageUnavailable { reason: String },

    /// Encoding or hashing failed. Indicates a defect, not bad input.
    #[error("internal error: {reason}")]
    Internal { reason: String },

    /// The caller cancelled the operation or its storage deadline elapsed.
    #[error("operation cancelled: {reason}")]
    Cancelled { reason: String },

    /// The admission gate refused the client.
    #[error("rate limit exceeded for client '{key}'")]
    RateLimited { key: String },

    /// Configuration could not be read or parsed.
    #[error("configuration error: {reason}")]
    Config { reason: String },
}

/// Stable classification of an `AttestError`.
///
/// Serializes to the snake_case code exposed at the service boundary
/// (`"validation"`, `"not_found"`, ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    NotFound,
    TransientConflict,
    StorageUnavailable,
    Internal,
    Cancelled,
    RateLimited,
    Config,
}

impl ErrorKind {
    /// The wire code for this kind.
    pub fn code(self) -> &'static str {
        match self {
            ErrorKind::Validation => "validation",
            ErrorKind::NotFound => "not_found",
            ErrorKind::TransientConflict => "transient_conflict",
            ErrorKind::StorageUnavailable => "storage_unavailable",
            ErrorKind::Internal => "internal",
            ErrorKind::Cancelled => "cancelled",
            ErrorKind::RateLimited => "rate_limited",
            ErrorKind::Config => "config",
        }
    }

    /// True when the same request may succeed if simply retried later.
    pub fn is_retryable(self) -> bool {
        matches!(
            self,
            ErrorKind::TransientConflict | ErrorKind::StorageUnavailable | ErrorKind::RateLimited
        )
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.code())
    }
}

impl AttestError {
    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            AttestError::Validation { .. } => ErrorKind::Validation,
            AttestError::NotFound { .. } => ErrorKind::NotFound,
            AttestError::TransientConflict { .. } => ErrorKind::TransientConflict,
            AttestError::StorageUnavailable { .. } => ErrorKind::StorageUnavailable,
            AttestError::Internal { .. } => ErrorKind::Internal,
            AttestError::Cancelled { .. } => ErrorKind::Cancelled,
            AttestError::RateLimited { .. } => ErrorKind::RateLimited,
            AttestError::Config { .. } => ErrorKind::Config,
        }
    }

    /// Shorthand for a `NotFound` error.
    pub fn not_found(what: impl Into<String>) -> Self {
        AttestError::NotFound { what: what.into() }
    }

    /// True for `NotFound`.
    pub fn is_not_found(&self) -> bool {
        matches!(self, AttestError::NotFound { .. })
    }
}

/// Convenience alias used throughout the attest crates.
pub type AttestResult<T> = Result<T, AttestError>;
