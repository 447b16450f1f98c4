use async_trait::async_trait;
use postern_common::{Mail, State};

use crate::{ConfigError, Mailet, MailetContext, MailetError, Parameters};

/// Ghosts the mail
#[derive(Debug, Clone, Copy, Default)]
pub struct Null;

#[async_trait]
impl Mailet for Null {
    fn info(&self) -> &str {
        "Null"
    }

    async fn service(&self, mail: &mut Mail, _ctx: &dyn MailetContext) -> Result<(), MailetError> {
        mail.set_state(State::ghost());
        Ok(())
    }
}

/// Moves the mail to another processor
#[derive(Debug, Clone)]
pub struct ToProcessor {
    processor: State,
    notice: Option<String>,
}

impl ToProcessor {
    pub fn new(processor: impl Into<State>) -> Self {
        Self {
            processor: processor.into(),
            notice: None,
        }
    }

    /// Record `notice` as the mail's error message on the way
    #[must_use]
    pub fn with_notice(mut self, notice: impl Into<String>) -> Self {
        self.notice = Some(notice.into());
        self
    }

    /// # Errors
    /// If `processor` is not set
    pub fn from_parameters(parameters: &Parameters) -> Result<Self, ConfigError> {
        let processor = parameters.require("ToProcessor", "processor")?;
        let mailet = Self::new(processor.trim());

        Ok(match parameters.get("notice") {
            Some(notice) => mailet.with_notice(notice),
            None => mailet,
        })
    }
}

#[async_trait]
impl Mailet for ToProcessor {
    fn info(&self) -> &str {
        "ToProcessor"
    }

    async fn service(&self, mail: &mut Mail, _ctx: &dyn MailetContext) -> Result<(), MailetError> {
        if let Some(notice) = &self.notice {
            mail.set_error_message(notice.clone());
        }
        mail.set_state(self.processor.clone());
        Ok(())
    }
}
