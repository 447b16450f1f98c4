use postern_common::{Address, Mail};

use crate::MatcherError;

/// Selects the recipients of a mail that a step applies to
///
/// Matchers are pure: they inspect the mail and never change it. Addresses
/// that are not recipients of the mail are ignored by the processor.
pub trait Matcher: Send + Sync + std::fmt::Debug {
    /// Name used in diagnostics, usually the registry name
    fn name(&self) -> &str;

    /// The subset of `mail`'s recipients this matcher selects
    ///
    /// # Errors
    /// If the condition cannot be evaluated for this mail
    fn matches(&self, mail: &Mail) -> Result<Vec<Address>, MatcherError>;
}
