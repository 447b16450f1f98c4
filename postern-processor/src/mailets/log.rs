use async_trait::async_trait;
use postern_common::{Mail, internal};

use crate::{Mailet, MailetContext, MailetError, Parameters};

/// Logs the mail at INFO and leaves it untouched
#[derive(Debug, Clone, Default)]
pub struct LogMessage {
    message: Option<String>,
}

impl LogMessage {
    pub fn from_parameters(parameters: &Parameters) -> Self {
        Self {
            message: parameters.get("message").map(ToString::to_string),
        }
    }
}

#[async_trait]
impl Mailet for LogMessage {
    fn info(&self) -> &str {
        "LogMessage"
    }

    async fn service(&self, mail: &mut Mail, _ctx: &dyn MailetContext) -> Result<(), MailetError> {
        let recipients: Vec<String> = mail.recipients().iter().map(ToString::to_string).collect();

        internal!(
            level = INFO,
            "{}: mail {} from {} to [{}] in {}",
            self.message.as_deref().unwrap_or("Mail"),
            mail.id(),
            mail.sender().map_or_else(|| "<>".to_string(), ToString::to_string),
            recipients.join(", "),
            mail.state()
        );

        Ok(())
    }
}
