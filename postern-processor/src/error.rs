//! Typed errors for matchers, mailets, processors and their configuration.
//!
//! Step failures never abort routing on their own: the processor records
//! them on the mail and moves it to the error state. Only a failure while a
//! mail is already in the error state surfaces as a [`ProcessorError`].

use postern_common::{AddressError, ContentError};
use thiserror::Error;

/// A matcher could not evaluate its condition.
#[derive(Debug, Error)]
pub enum MatcherError {
    #[error("{0}")]
    Failed(String),
}

/// A mailet failed while servicing a mail.
#[derive(Debug, Error)]
pub enum MailetError {
    #[error("{0}")]
    Failed(String),

    /// The mailet added recipients that were not part of the mail it was given.
    #[error("Mailet added recipients it was not given: {0}")]
    WidenedRecipients(String),

    /// Handing mail to the surrounding system failed.
    #[error("Context error: {0}")]
    Context(String),

    #[error("Content error: {0}")]
    Content(#[from] ContentError),
}

/// A step failed while the mail was already in the error state.
#[derive(Debug, Error)]
pub enum ProcessorError {
    #[error("Matcher {matcher} in processor {processor} failed: {source}")]
    Matcher {
        processor: String,
        matcher: String,
        #[source]
        source: MatcherError,
    },

    #[error("Mailet {mailet} in processor {processor} failed: {source}")]
    Mailet {
        processor: String,
        mailet: String,
        #[source]
        source: MailetError,
    },
}

/// Processor configuration could not be resolved.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Unknown matcher: {0}")]
    UnknownMatcher(String),

    #[error("Unknown mailet: {0}")]
    UnknownMailet(String),

    #[error("{name} requires a condition")]
    MissingCondition { name: String },

    #[error("{name} requires the parameter '{parameter}'")]
    MissingParameter { name: String, parameter: String },

    #[error("Invalid address in {name}: {source}")]
    InvalidAddress {
        name: String,
        #[source]
        source: AddressError,
    },

    #[error("Processor '{0}' is configured more than once")]
    DuplicateProcessor(String),

    #[error("Processor name '{0}' is reserved")]
    ReservedProcessor(String),

    #[error("No '{0}' processor is configured")]
    MissingErrorProcessor(String),
}
