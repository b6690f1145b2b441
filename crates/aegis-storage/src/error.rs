//! Storage error types.

use aegis_core::PolicyError;

/// Errors that can occur while loading or saving principals and policies.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// The DSN string cannot be parsed or lacks a host.
    #[error("invalid storage DSN: {reason}")]
    InvalidDsn { reason: String },

    /// The DSN scheme has no backend.
    #[error("no storage backend for scheme '{scheme}'")]
    UnsupportedScheme { scheme: String },

    /// The database rejected an operation.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A stored row does not decode into a valid document.
    #[error("stored policy document is malformed: {reason}")]
    Corrupt { reason: String },

    /// A loaded policy violates the document invariants.
    #[error(transparent)]
    Policy(#[from] PolicyError),
}
