use async_trait::async_trait;
use parking_lot::Mutex;
use postern_common::{Address, Mail, outgoing};

use crate::MailetError;

/// An action applied to the recipients a matcher selected
///
/// The mail handed to [`Mailet::service`] only carries the matched
/// recipients. A mailet may change its state, recipients (narrowing only),
/// attributes or content, and may reach the rest of the system through the
/// [`MailetContext`].
#[async_trait]
pub trait Mailet: Send + Sync + std::fmt::Debug {
    /// Name used in diagnostics, usually the registry name
    fn info(&self) -> &str;

    /// # Errors
    /// If the mail could not be serviced; the processor records the failure
    /// on the mail
    async fn service(&self, mail: &mut Mail, ctx: &dyn MailetContext) -> Result<(), MailetError>;

    /// Called once when the owning router shuts down
    fn destroy(&self) {}
}

/// What a mailet may ask of the surrounding system
#[async_trait]
pub trait MailetContext: Send + Sync {
    /// Inject a new mail for processing
    ///
    /// # Errors
    /// If the mail cannot be queued
    async fn send_mail(&self, mail: Mail) -> Result<(), MailetError>;

    /// Address used as the sender of notifications
    fn postmaster(&self) -> Option<&Address>;

    /// Record a mail that is being dropped after repeated failure
    ///
    /// Without an override the mail is only logged.
    async fn dead_letter(&self, mail: &Mail, reason: &str) {
        outgoing!(
            level = WARN,
            "Dropping mail {} for {} recipient(s): {reason}",
            mail.id(),
            mail.recipients().len()
        );
    }
}

/// In-memory [`MailetContext`] that records what it was asked to do
///
/// Useful in tests and for dry runs of a processor configuration.
#[derive(Debug, Default)]
pub struct MockContext {
    postmaster: Option<Address>,
    sent: Mutex<Vec<Mail>>,
    dead_letters: Mutex<Vec<(Mail, String)>>,
}

impl MockContext {
    #[must_use]
    pub fn new(postmaster: Option<Address>) -> Self {
        Self {
            postmaster,
            ..Self::default()
        }
    }

    /// Mail handed to [`MailetContext::send_mail`] so far
    pub fn sent(&self) -> Vec<Mail> {
        self.sent.lock().clone()
    }

    /// Mail handed to [`MailetContext::dead_letter`] so far, with reasons
    pub fn dead_letters(&self) -> Vec<(Mail, String)> {
        self.dead_letters.lock().clone()
    }
}

#[async_trait]
impl MailetContext for MockContext {
    async fn send_mail(&self, mail: Mail) -> Result<(), MailetError> {
        self.sent.lock().push(mail);
        Ok(())
    }

    fn postmaster(&self) -> Option<&Address> {
        self.postmaster.as_ref()
    }

    async fn dead_letter(&self, mail: &Mail, reason: &str) {
        self.dead_letters
            .lock()
            .push((mail.clone(), reason.to_string()));
    }
}
