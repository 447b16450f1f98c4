use postern_common::{Address, Mail};

use crate::{Matcher, MatcherError};

/// Matches every recipient when an attribute is set, optionally to a given value
///
/// The condition is either `name` or `name=value`.
#[derive(Debug, Clone)]
pub struct HasAttribute {
    name: String,
    value: Option<String>,
}

impl HasAttribute {
    pub fn new(condition: &str) -> Self {
        let (name, value) = condition
            .split_once('=')
            .map_or((condition, None), |(n, v)| (n, Some(v.trim().to_string())));

        Self {
            name: name.trim().to_string(),
            value,
        }
    }
}

impl Matcher for HasAttribute {
    fn name(&self) -> &str {
        "HasAttribute"
    }

    fn matches(&self, mail: &Mail) -> Result<Vec<Address>, MatcherError> {
        let hit = match (mail.attribute(&self.name), &self.value) {
            (Some(actual), Some(expected)) => actual == expected,
            (Some(_), None) => true,
            (None, _) => false,
        };

        Ok(if hit { mail.recipients().to_vec() } else { Vec::new() })
    }
}

/// Matches every recipient of mail that carries an error message
#[derive(Debug, Clone, Copy, Default)]
pub struct HasError;

impl Matcher for HasError {
    fn name(&self) -> &str {
        "HasError"
    }

    fn matches(&self, mail: &Mail) -> Result<Vec<Address>, MatcherError> {
        Ok(if mail.error_message().is_some() {
            mail.recipients().to_vec()
        } else {
            Vec::new()
        })
    }
}
