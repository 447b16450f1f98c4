//! Error types for the postern-spool crate.

use std::io;

use postern_common::{ContentError, MailId};
use thiserror::Error;

/// Top-level spool error type.
#[derive(Debug, Error)]
pub enum SpoolError {
    /// I/O operation failed (file read/write/delete).
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Serialization or deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] SerializationError),

    /// Mail not found in the spool.
    #[error("Mail not found: {0}")]
    NotFound(MailId),

    /// Spool directory or identifier validation failed.
    #[error("Spool validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Message content could not be materialised for writing.
    #[error("Content error: {0}")]
    Content(#[from] ContentError),

    /// The memory store is full.
    #[error("Memory spool capacity exceeded: {len}/{capacity} mails")]
    CapacityExceeded { len: usize, capacity: usize },

    /// Internal error (lock poisoning, etc.).
    #[error("Internal error: {0}")]
    Internal(String),
}

impl SpoolError {
    /// Whether this error only reports that the mail was already gone
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::NotFound(_) => true,
            Self::Io(err) => matches!(err.kind(), io::ErrorKind::NotFound),
            _ => false,
        }
    }
}

/// Serialization and deserialization errors.
#[derive(Debug, Error)]
pub enum SerializationError {
    /// Bincode serialization failed.
    #[error("Bincode encode error: {0}")]
    Encode(#[from] bincode::error::EncodeError),

    /// Bincode deserialization failed.
    #[error("Bincode decode error: {0}")]
    Decode(#[from] bincode::error::DecodeError),

    /// Stored metadata names a different mail than its file name.
    #[error("Corrupted spool entry: {0}")]
    Corrupted(String),
}

/// Spool directory and identifier validation errors.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// Spool path is not a directory.
    #[error("Spool path is not a directory: {0}")]
    NotDirectory(String),

    /// Spool path is relative, traverses upwards, or points into a system directory.
    #[error("Invalid spool path: {0}")]
    InvalidPath(String),

    /// The id cannot be used as a file name.
    #[error("Mail id cannot be stored on disk: {0}")]
    UnsafeId(String),
}

/// Specialized `Result` type for spool operations.
pub type Result<T> = std::result::Result<T, SpoolError>;

impl<T> From<std::sync::PoisonError<T>> for SpoolError {
    fn from(e: std::sync::PoisonError<T>) -> Self {
        Self::Internal(format!("Lock poisoned: {e}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_error_conversion() {
        let io_err = io::Error::new(io::ErrorKind::PermissionDenied, "access denied");
        let spool_err = SpoolError::from(io_err);

        assert!(matches!(spool_err, SpoolError::Io(_)));
        assert!(spool_err.to_string().contains("access denied"));
        assert!(!spool_err.is_not_found());
    }

    #[test]
    fn test_not_found_detection() {
        assert!(SpoolError::NotFound(MailId::from("m1")).is_not_found());
        assert!(SpoolError::from(io::Error::from(io::ErrorKind::NotFound)).is_not_found());
    }
}
