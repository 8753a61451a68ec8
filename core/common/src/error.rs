//! Common error types for CareSync.

use thiserror::Error;

/// Top-level error type for CareSync operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Network operation failed (connection refused, DNS, reset, 5xx).
    #[error("Network error: {0}")]
    Network(String),

    /// Network operation did not complete in time.
    #[error("Timed out: {0}")]
    Timeout(String),

    /// The current run was cancelled from outside.
    #[error("Operation cancelled")]
    Cancelled,

    /// Remote store rejected the request for quota or permission reasons.
    #[error("Quota or permission error: {0}")]
    QuotaOrPermission(String),

    /// Local record store failed (corruption or schema mismatch).
    #[error("Local store error: {0}")]
    LocalStore(String),

    /// A document or payload could not be decoded.
    #[error("Deserialization error: {0}")]
    Deserialization(String),

    /// A record failed field validation.
    #[error("Invalid record: {0}")]
    InvalidRecord(String),

    /// I/O operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid input provided.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Resource not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Unexpected internal condition.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias using the common Error.
pub type Result<T> = std::result::Result<T, Error>;
