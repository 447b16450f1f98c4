//! Name-to-factory registry for matchers and mailets
//!
//! Processor configuration names its steps by string. The registry resolves
//! those names once at startup and builds an immutable [`ProcessorRouter`].
//!
//! ```ron
//! processors: [
//!     (
//!         name: "root",
//!         steps: [
//!             (matcher: "HostIs=example.com", mailet: "ToProcessor", parameters: {"processor": "local"}),
//!             (matcher: "All", mailet: "ToProcessor", parameters: {"processor": "transport"}),
//!         ],
//!     ),
//!     (name: "error", steps: [(matcher: "All", mailet: "ToDeadLetter")]),
//! ]
//! ```

use std::sync::Arc;

use ahash::AHashMap;
use postern_common::{Address, internal};
use serde::Deserialize;

use crate::{
    ConfigError, Mailet, Matcher, Processor, ProcessorRouter, mailets, matchers,
};

/// Free-form step parameters
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(transparent)]
pub struct Parameters(AHashMap<String, String>);

impl Parameters {
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    /// # Errors
    /// If `key` is not set
    pub fn require(&self, name: &str, key: &str) -> Result<&str, ConfigError> {
        self.get(key).ok_or_else(|| ConfigError::MissingParameter {
            name: name.to_string(),
            parameter: key.to_string(),
        })
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Parameters {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

/// Parse a comma separated list of addresses
///
/// # Errors
/// If any entry is not a valid address
pub fn parse_addresses(name: &str, list: &str) -> Result<Vec<Address>, ConfigError> {
    list.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse().map_err(|source| ConfigError::InvalidAddress {
                name: name.to_string(),
                source,
            })
        })
        .collect()
}

/// One step of a processor: a matcher expression and a mailet with its parameters
#[derive(Debug, Clone, Deserialize)]
pub struct StepDescriptor {
    /// `Name` or `Name=condition`
    pub matcher: String,
    pub mailet: String,
    #[serde(default)]
    pub parameters: Parameters,
}

/// A processor and its steps, as read from configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ProcessorDescriptor {
    pub name: String,
    #[serde(default)]
    pub steps: Vec<StepDescriptor>,
}

/// Builds a matcher from its optional condition
pub type MatcherFactory =
    Arc<dyn Fn(Option<&str>) -> Result<Box<dyn Matcher>, ConfigError> + Send + Sync>;

/// Builds a mailet from its parameters
pub type MailetFactory =
    Arc<dyn Fn(&Parameters) -> Result<Box<dyn Mailet>, ConfigError> + Send + Sync>;

/// Matcher and mailet factories, by name
#[derive(Clone, Default)]
pub struct Registry {
    matchers: AHashMap<String, MatcherFactory>,
    mailets: AHashMap<String, MailetFactory>,
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut matchers: Vec<_> = self.matchers.keys().collect();
        let mut mailets: Vec<_> = self.mailets.keys().collect();
        matchers.sort_unstable();
        mailets.sort_unstable();

        f.debug_struct("Registry")
            .field("matchers", &matchers)
            .field("mailets", &mailets)
            .finish()
    }
}

impl Registry {
    /// A registry with nothing registered
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// A registry holding every built-in matcher and mailet
    #[must_use]
    pub fn with_builtins() -> Self {
        let mut registry = Self::empty();
        matchers::register(&mut registry);
        mailets::register(&mut registry);
        registry
    }

    pub fn register_matcher<F>(&mut self, name: impl Into<String>, factory: F) -> &mut Self
    where
        F: Fn(Option<&str>) -> Result<Box<dyn Matcher>, ConfigError> + Send + Sync + 'static,
    {
        self.matchers.insert(name.into(), Arc::new(factory));
        self
    }

    pub fn register_mailet<F>(&mut self, name: impl Into<String>, factory: F) -> &mut Self
    where
        F: Fn(&Parameters) -> Result<Box<dyn Mailet>, ConfigError> + Send + Sync + 'static,
    {
        self.mailets.insert(name.into(), Arc::new(factory));
        self
    }

    /// Build a matcher from `Name` or `Name=condition`
    ///
    /// # Errors
    /// If the name is unknown or the condition is rejected
    pub fn matcher(&self, expression: &str) -> Result<Box<dyn Matcher>, ConfigError> {
        let (name, condition) = match expression.split_once('=') {
            Some((name, condition)) => (name.trim(), Some(condition.trim())),
            None => (expression.trim(), None),
        };

        let factory = self
            .matchers
            .get(name)
            .ok_or_else(|| ConfigError::UnknownMatcher(name.to_string()))?;

        factory(condition)
    }

    /// # Errors
    /// If the name is unknown or the parameters are rejected
    pub fn mailet(&self, name: &str, parameters: &Parameters) -> Result<Box<dyn Mailet>, ConfigError> {
        let factory = self
            .mailets
            .get(name)
            .ok_or_else(|| ConfigError::UnknownMailet(name.to_string()))?;

        factory(parameters)
    }

    /// # Errors
    /// If any step cannot be resolved
    pub fn processor(&self, descriptor: &ProcessorDescriptor) -> Result<Processor, ConfigError> {
        let mut processor = Processor::new(descriptor.name.as_str());

        for step in &descriptor.steps {
            processor.push(
                self.matcher(&step.matcher)?,
                self.mailet(&step.mailet, &step.parameters)?,
            );
        }

        internal!(
            level = DEBUG,
            "Resolved processor {}: {:?}",
            descriptor.name,
            processor.describe()
        );

        Ok(processor)
    }

    /// Resolve every descriptor and build the router
    ///
    /// # Errors
    /// If a step cannot be resolved, or the processors do not form a valid router
    pub fn router(
        &self,
        descriptors: &[ProcessorDescriptor],
        max_dispatches: Option<usize>,
    ) -> Result<ProcessorRouter, ConfigError> {
        descriptors
            .iter()
            .try_fold(ProcessorRouter::builder(), |builder, descriptor| {
                Ok(builder.processor(self.processor(descriptor)?))
            })?
            .max_dispatches(max_dispatches)
            .build()
    }
}
