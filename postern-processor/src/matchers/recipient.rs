use postern_common::{Address, Domain, Mail};

use crate::{ConfigError, Matcher, MatcherError, registry::parse_addresses};

/// Matches every recipient
#[derive(Debug, Clone, Copy, Default)]
pub struct All;

impl Matcher for All {
    fn name(&self) -> &str {
        "All"
    }

    fn matches(&self, mail: &Mail) -> Result<Vec<Address>, MatcherError> {
        Ok(mail.recipients().to_vec())
    }
}

/// Matches recipients that appear in a fixed list
#[derive(Debug, Clone)]
pub struct RecipientIs {
    addresses: Vec<Address>,
}

impl RecipientIs {
    /// # Errors
    /// If the list contains an invalid address
    pub fn new(list: &str) -> Result<Self, ConfigError> {
        Ok(Self {
            addresses: parse_addresses("RecipientIs", list)?,
        })
    }

    #[must_use]
    pub const fn from_addresses(addresses: Vec<Address>) -> Self {
        Self { addresses }
    }
}

impl Matcher for RecipientIs {
    fn name(&self) -> &str {
        "RecipientIs"
    }

    fn matches(&self, mail: &Mail) -> Result<Vec<Address>, MatcherError> {
        Ok(mail
            .recipients()
            .iter()
            .filter(|rcpt| self.addresses.contains(rcpt))
            .cloned()
            .collect())
    }
}

/// Matches recipients at one of a list of domains
#[derive(Debug, Clone)]
pub struct HostIs {
    domains: Vec<Domain>,
}

impl HostIs {
    pub fn new(list: &str) -> Self {
        Self {
            domains: list
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(Domain::from)
                .collect(),
        }
    }
}

impl Matcher for HostIs {
    fn name(&self) -> &str {
        "HostIs"
    }

    fn matches(&self, mail: &Mail) -> Result<Vec<Address>, MatcherError> {
        Ok(mail
            .recipients()
            .iter()
            .filter(|rcpt| self.domains.contains(rcpt.domain()))
            .cloned()
            .collect())
    }
}
