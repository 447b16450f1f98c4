//! Error types for the postern-common crate.

use std::{io, path::PathBuf};

use thiserror::Error;

/// Errors produced while parsing a mailbox address.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AddressError {
    /// Empty input
    #[error("Address is empty")]
    Empty,

    /// No `@` separating the local part from the domain
    #[error("Address is missing '@': {0}")]
    MissingAtSign(String),

    /// Local part is empty or too long
    #[error("Invalid local part in address: {0}")]
    InvalidLocalPart(String),

    /// Domain is empty, too long, or contains invalid characters
    #[error("Invalid domain in address: {0}")]
    InvalidDomain(String),

    /// The input held a group or more than one mailbox
    #[error("Expected a single mailbox: {0}")]
    NotSingle(String),

    /// The header-style parser rejected the input
    #[error("Unable to parse address: {0}")]
    Parse(String),
}

/// Errors produced while materialising message content.
#[derive(Debug, Error)]
pub enum ContentError {
    /// Reading the backing file failed.
    #[error("Unable to read message content from {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

#[cfg(test)]
mod tests {
    use std::error::Error as StdError;

    use super::*;

    #[test]
    fn test_address_error_display() {
        let err = AddressError::MissingAtSign("postmaster".to_string());
        assert_eq!(err.to_string(), "Address is missing '@': postmaster");
    }

    #[test]
    fn test_content_error_keeps_source() {
        let err = ContentError::Read {
            path: PathBuf::from("/var/spool/postern/m1.eml"),
            source: io::Error::new(io::ErrorKind::NotFound, "gone"),
        };

        assert!(err.source().is_some());
        assert!(err.to_string().contains("m1.eml"));
    }
}
