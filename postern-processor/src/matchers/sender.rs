use postern_common::{Address, Mail};

use crate::{ConfigError, Matcher, MatcherError, registry::parse_addresses};

/// Matches every recipient when the sender is one of a fixed list
#[derive(Debug, Clone)]
pub struct SenderIs {
    senders: Vec<Address>,
}

impl SenderIs {
    /// # Errors
    /// If the list contains an invalid address
    pub fn new(list: &str) -> Result<Self, ConfigError> {
        Ok(Self {
            senders: parse_addresses("SenderIs", list)?,
        })
    }
}

impl Matcher for SenderIs {
    fn name(&self) -> &str {
        "SenderIs"
    }

    fn matches(&self, mail: &Mail) -> Result<Vec<Address>, MatcherError> {
        Ok(match mail.sender() {
            Some(sender) if self.senders.contains(sender) => mail.recipients().to_vec(),
            _ => Vec::new(),
        })
    }
}

/// Matches every recipient of mail with a null sender (bounces)
#[derive(Debug, Clone, Copy, Default)]
pub struct SenderIsNull;

impl Matcher for SenderIsNull {
    fn name(&self) -> &str {
        "SenderIsNull"
    }

    fn matches(&self, mail: &Mail) -> Result<Vec<Address>, MatcherError> {
        Ok(if mail.sender().is_none() {
            mail.recipients().to_vec()
        } else {
            Vec::new()
        })
    }
}
