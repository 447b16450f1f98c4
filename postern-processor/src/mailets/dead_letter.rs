use async_trait::async_trait;
use postern_common::{Mail, State};

use crate::{Mailet, MailetContext, MailetError, Parameters};

const DEFAULT_REASON: &str = "Sent to dead letter";

/// Hands the mail to the context's dead-letter hook and ghosts it
///
/// The recorded reason is the mail's error message when it has one.
#[derive(Debug, Clone, Default)]
pub struct ToDeadLetter {
    reason: Option<String>,
}

impl ToDeadLetter {
    pub fn from_parameters(parameters: &Parameters) -> Self {
        Self {
            reason: parameters.get("reason").map(ToString::to_string),
        }
    }
}

#[async_trait]
impl Mailet for ToDeadLetter {
    fn info(&self) -> &str {
        "ToDeadLetter"
    }

    async fn service(&self, mail: &mut Mail, ctx: &dyn MailetContext) -> Result<(), MailetError> {
        let reason = mail
            .error_message()
            .or(self.reason.as_deref())
            .unwrap_or(DEFAULT_REASON)
            .to_string();

        ctx.dead_letter(mail, &reason).await;
        mail.set_state(State::ghost());
        Ok(())
    }
}
