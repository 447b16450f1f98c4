use async_trait::async_trait;
use postern_common::{Address, Mail, MailId, State, internal};

use crate::{
    ConfigError, Mailet, MailetContext, MailetError, Parameters, registry::parse_addresses,
};

const DEFAULT_BOUNCE_REASON: &str = "Delivery failed";

/// Sends a delivery failure notice to the sender, then ghosts the mail
///
/// The notice itself has a null sender and comes from the postmaster in its
/// headers only. Mail with a null sender is ghosted without a notice, so
/// bounces never bounce.
#[derive(Debug, Clone, Default)]
pub struct Bounce {
    message: Option<String>,
}

impl Bounce {
    pub fn from_parameters(parameters: &Parameters) -> Self {
        Self {
            message: parameters.get("message").map(ToString::to_string),
        }
    }

    fn notice(&self, mail: &Mail, sender: Address, postmaster: Option<&Address>) -> Mail {
        let reason = mail
            .error_message()
            .or(self.message.as_deref())
            .unwrap_or(DEFAULT_BOUNCE_REASON);

        let recipients: Vec<String> = mail.recipients().iter().map(ToString::to_string).collect();
        let from = postmaster.map_or_else(|| "<>".to_string(), ToString::to_string);

        let body = format!(
            "From: {from}\r\n\
             To: {sender}\r\n\
             Subject: Undelivered Mail Returned to Sender\r\n\
             \r\n\
             Your message {id} could not be delivered to the following recipients:\r\n\
             \r\n\
             {rcpts}\r\n\
             \r\n\
             Reason: {reason}\r\n",
            id = mail.id(),
            rcpts = recipients.join("\r\n"),
        );

        Mail::builder()
            .sender(None)
            .recipient(sender)
            .content(body.into_bytes())
            .attribute("bounce-of", mail.id().as_str())
            .build()
    }
}

#[async_trait]
impl Mailet for Bounce {
    fn info(&self) -> &str {
        "Bounce"
    }

    async fn service(&self, mail: &mut Mail, ctx: &dyn MailetContext) -> Result<(), MailetError> {
        if let Some(sender) = mail.sender().cloned() {
            let notice = self.notice(mail, sender, ctx.postmaster());
            internal!(
                level = INFO,
                "Bouncing mail {} back to its sender as {}",
                mail.id(),
                notice.id()
            );
            ctx.send_mail(notice).await?;
        } else {
            internal!(level = DEBUG, "Not bouncing mail {} with a null sender", mail.id());
        }

        mail.set_state(State::ghost());
        Ok(())
    }
}

/// Re-injects a copy of the mail addressed to fixed recipients, then ghosts
/// the original
#[derive(Debug, Clone)]
pub struct Forward {
    forward_to: Vec<Address>,
}

impl Forward {
    /// # Errors
    /// If `forwardto` is missing, empty, or holds an invalid address
    pub fn from_parameters(parameters: &Parameters) -> Result<Self, ConfigError> {
        let forward_to = parse_addresses("Forward", parameters.require("Forward", "forwardto")?)?;

        if forward_to.is_empty() {
            return Err(ConfigError::MissingParameter {
                name: "Forward".to_string(),
                parameter: "forwardto".to_string(),
            });
        }

        Ok(Self { forward_to })
    }
}

#[async_trait]
impl Mailet for Forward {
    fn info(&self) -> &str {
        "Forward"
    }

    async fn service(&self, mail: &mut Mail, ctx: &dyn MailetContext) -> Result<(), MailetError> {
        let mut copy = mail.duplicate(MailId::generate(), self.forward_to.clone());
        copy.set_state(State::root());
        copy.touch();

        internal!(
            level = INFO,
            "Forwarding mail {} as {} to {} recipient(s)",
            mail.id(),
            copy.id(),
            self.forward_to.len()
        );

        ctx.send_mail(copy).await?;
        mail.set_state(State::ghost());
        Ok(())
    }
}
