//! The [`MailetContext`] mailets see while the spool manager routes mail

use std::sync::Arc;

use async_trait::async_trait;
use postern_common::{Address, Mail, outgoing};
use postern_processor::{MailetContext, MailetError};
use postern_spool::{BackingStore, MailQueue, SpoolEntry};

/// Attribute recording why a mail was dead-lettered
pub const DEAD_LETTER_REASON: &str = "dead-letter-reason";

/// Re-injects mail into the queue it was claimed from and keeps dead letters
/// in an optional separate store
#[derive(Debug, Clone)]
pub struct QueueContext {
    queue: Arc<MailQueue>,
    postmaster: Option<Address>,
    dead_letters: Option<Arc<dyn BackingStore>>,
}

impl QueueContext {
    pub const fn new(queue: Arc<MailQueue>) -> Self {
        Self {
            queue,
            postmaster: None,
            dead_letters: None,
        }
    }

    #[must_use]
    pub fn with_postmaster(mut self, postmaster: Option<Address>) -> Self {
        self.postmaster = postmaster;
        self
    }

    /// Keep dead-lettered mail in `store` instead of only logging it
    #[must_use]
    pub fn with_dead_letters(mut self, store: Option<Arc<dyn BackingStore>>) -> Self {
        self.dead_letters = store;
        self
    }

    pub const fn queue(&self) -> &Arc<MailQueue> {
        &self.queue
    }
}

#[async_trait]
impl MailetContext for QueueContext {
    async fn send_mail(&self, mut mail: Mail) -> Result<(), MailetError> {
        mail.set_arrived_at(std::time::SystemTime::now());
        self.queue
            .store(&mail)
            .await
            .map_err(|err| MailetError::Context(err.to_string()))
    }

    fn postmaster(&self) -> Option<&Address> {
        self.postmaster.as_ref()
    }

    async fn dead_letter(&self, mail: &Mail, reason: &str) {
        let Some(store) = &self.dead_letters else {
            outgoing!(
                level = WARN,
                "Dropping mail {} for {} recipient(s): {reason}",
                mail.id(),
                mail.recipients().len()
            );
            return;
        };

        let mut kept = mail.clone();
        kept.set_attribute(DEAD_LETTER_REASON, reason);

        match store.write(&SpoolEntry::new(kept, None)).await {
            Ok(()) => outgoing!(
                level = WARN,
                "Moved mail {} to the dead-letter store: {reason}",
                mail.id()
            ),
            Err(err) => outgoing!(
                level = ERROR,
                "Unable to keep dead letter {} ({reason}): {err}",
                mail.id()
            ),
        }
    }
}
