use async_trait::async_trait;
use postern_common::Mail;

use crate::{ConfigError, Mailet, MailetContext, MailetError, Parameters};

/// Sets every configured parameter as an attribute on the mail
#[derive(Debug, Clone, Default)]
pub struct SetAttribute {
    attributes: Vec<(String, String)>,
}

impl SetAttribute {
    pub fn from_parameters(parameters: &Parameters) -> Self {
        let mut attributes: Vec<_> = parameters
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        attributes.sort_unstable();

        Self { attributes }
    }
}

#[async_trait]
impl Mailet for SetAttribute {
    fn info(&self) -> &str {
        "SetAttribute"
    }

    async fn service(&self, mail: &mut Mail, _ctx: &dyn MailetContext) -> Result<(), MailetError> {
        for (name, value) in &self.attributes {
            mail.set_attribute(name.clone(), value.clone());
        }
        Ok(())
    }
}

/// Removes attributes from the mail
#[derive(Debug, Clone)]
pub struct RemoveAttribute {
    names: Vec<String>,
}

impl RemoveAttribute {
    /// # Errors
    /// If `name` is not set
    pub fn from_parameters(parameters: &Parameters) -> Result<Self, ConfigError> {
        let names = parameters
            .require("RemoveAttribute", "name")?
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(ToString::to_string)
            .collect();

        Ok(Self { names })
    }
}

#[async_trait]
impl Mailet for RemoveAttribute {
    fn info(&self) -> &str {
        "RemoveAttribute"
    }

    async fn service(&self, mail: &mut Mail, _ctx: &dyn MailetContext) -> Result<(), MailetError> {
        let attributes = mail.attributes_mut();
        for name in &self.names {
            attributes.remove(name);
        }
        Ok(())
    }
}
