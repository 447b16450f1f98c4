//! The mail envelope routed through the spool and the processors

use std::{
    fmt::{self, Display},
    path::PathBuf,
    sync::Arc,
    time::SystemTime,
};

use ahash::AHashMap;
use serde::{Deserialize, Serialize};

use crate::{address::Address, error::ContentError, state::State};

/// Free-form attributes used by processing steps to talk to each other
pub type Attributes = AHashMap<String, String>;

/// Identifier of a mail in the spool
///
/// Generated ids are ULIDs, so they sort by creation time. Producers may also
/// supply their own identifiers.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MailId(Arc<str>);

impl MailId {
    #[must_use]
    pub fn new(id: impl Into<Arc<str>>) -> Self {
        Self(id.into())
    }

    /// Generate a new unique identifier
    #[must_use]
    pub fn generate() -> Self {
        Self(Arc::from(ulid::Ulid::new().to_string()))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for MailId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for MailId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for MailId {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

/// Reference to the raw message bytes
///
/// Content held in a spool file is only read when a step asks for it.
#[derive(Debug, Clone, Default)]
pub enum Content {
    #[default]
    Empty,
    Bytes(Arc<[u8]>),
    File(PathBuf),
}

impl Content {
    /// Read the message bytes, loading them from disk if necessary
    ///
    /// # Errors
    /// If the content lives in a file that cannot be read
    pub async fn load(&self) -> Result<Arc<[u8]>, ContentError> {
        match self {
            Self::Empty => Ok(Arc::from(Vec::new())),
            Self::Bytes(bytes) => Ok(Arc::clone(bytes)),
            Self::File(path) => tokio::fs::read(path)
                .await
                .map(Arc::from)
                .map_err(|source| ContentError::Read {
                    path: path.clone(),
                    source,
                }),
        }
    }

    /// Load file-backed content into memory, so it outlives the spool file
    ///
    /// # Errors
    /// If the content lives in a file that cannot be read
    pub async fn materialize(&mut self) -> Result<Arc<[u8]>, ContentError> {
        let bytes = self.load().await?;
        *self = Self::Bytes(Arc::clone(&bytes));
        Ok(bytes)
    }

    #[must_use]
    pub const fn is_materialized(&self) -> bool {
        !matches!(self, Self::File(_))
    }
}

impl From<Vec<u8>> for Content {
    fn from(value: Vec<u8>) -> Self {
        Self::Bytes(Arc::from(value))
    }
}

impl From<&[u8]> for Content {
    fn from(value: &[u8]) -> Self {
        Self::Bytes(Arc::from(value))
    }
}

/// A message in flight: who it is from, who it is for, and where it goes next
///
/// A mail is *terminal* once its state is [`State::GHOST`] or it has no
/// recipients left. Both conditions are checked independently.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Mail {
    id: MailId,
    sender: Option<Address>,
    recipients: Vec<Address>,
    state: State,
    error_message: Option<String>,
    #[serde(skip)]
    content: Content,
    attributes: Attributes,
    last_updated: SystemTime,
    arrived_at: SystemTime,
}

impl Mail {
    #[must_use]
    pub fn builder() -> MailBuilder {
        MailBuilder::default()
    }

    #[inline]
    pub const fn id(&self) -> &MailId {
        &self.id
    }

    /// The reverse path; `None` for the null sender
    #[inline]
    pub const fn sender(&self) -> Option<&Address> {
        self.sender.as_ref()
    }

    #[inline]
    pub const fn sender_mut(&mut self) -> &mut Option<Address> {
        &mut self.sender
    }

    #[inline]
    pub fn recipients(&self) -> &[Address] {
        &self.recipients
    }

    /// Replace the recipients, dropping duplicates while keeping order
    pub fn set_recipients(&mut self, recipients: impl IntoIterator<Item = Address>) {
        self.recipients.clear();
        for recipient in recipients {
            if !self.recipients.contains(&recipient) {
                self.recipients.push(recipient);
            }
        }
    }

    pub fn retain_recipients(&mut self, f: impl FnMut(&Address) -> bool) {
        self.recipients.retain(f);
    }

    #[inline]
    pub const fn state(&self) -> &State {
        &self.state
    }

    pub fn set_state(&mut self, state: impl Into<State>) {
        self.state = state.into();
    }

    #[inline]
    pub fn error_message(&self) -> Option<&str> {
        self.error_message.as_deref()
    }

    pub fn set_error_message(&mut self, message: impl Into<String>) {
        self.error_message = Some(message.into());
    }

    #[inline]
    pub const fn content(&self) -> &Content {
        &self.content
    }

    #[inline]
    pub const fn content_mut(&mut self) -> &mut Content {
        &mut self.content
    }

    pub fn set_content(&mut self, content: impl Into<Content>) {
        self.content = content.into();
    }

    #[inline]
    pub const fn attributes(&self) -> &Attributes {
        &self.attributes
    }

    #[inline]
    pub const fn attributes_mut(&mut self) -> &mut Attributes {
        &mut self.attributes
    }

    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }

    pub fn set_attribute(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.attributes.insert(name.into(), value.into());
    }

    #[inline]
    pub const fn last_updated(&self) -> SystemTime {
        self.last_updated
    }

    #[inline]
    pub const fn arrived_at(&self) -> SystemTime {
        self.arrived_at
    }

    /// Stamp this mail as updated now
    pub fn touch(&mut self) {
        self.last_updated = SystemTime::now();
    }

    /// Set the time this mail was last updated
    pub const fn set_last_updated(&mut self, at: SystemTime) {
        self.last_updated = at;
    }

    /// Set the arrival time (used by stores to keep arrival order across overwrites)
    pub const fn set_arrived_at(&mut self, at: SystemTime) {
        self.arrived_at = at;
    }

    #[inline]
    pub fn is_ghost(&self) -> bool {
        self.state.is_ghost()
    }

    #[inline]
    pub fn has_recipients(&self) -> bool {
        !self.recipients.is_empty()
    }

    /// Whether this mail has finished processing and should be disposed
    #[inline]
    pub fn is_terminal(&self) -> bool {
        self.is_ghost() || !self.has_recipients()
    }

    /// Copy this mail under a new identity, with the given recipients
    #[must_use]
    pub fn duplicate(&self, id: MailId, recipients: Vec<Address>) -> Self {
        let mut copy = self.clone();
        copy.id = id;
        copy.set_recipients(recipients);
        copy
    }

    /// Move `matched` recipients into a new mail with a fresh id.
    ///
    /// `self` keeps every recipient that was not matched. Addresses in
    /// `matched` that are not recipients of `self` are ignored, so the child
    /// never holds more recipients than its parent did.
    #[must_use]
    pub fn split(&mut self, matched: &[Address]) -> Self {
        let (moved, kept): (Vec<_>, Vec<_>) = std::mem::take(&mut self.recipients)
            .into_iter()
            .partition(|rcpt| matched.contains(rcpt));

        self.recipients = kept;
        self.duplicate(MailId::generate(), moved)
    }
}

/// Builder for [`Mail`]
#[derive(Debug, Default)]
pub struct MailBuilder {
    id: Option<MailId>,
    sender: Option<Address>,
    recipients: Vec<Address>,
    state: Option<State>,
    content: Content,
    attributes: Attributes,
}

impl MailBuilder {
    #[must_use]
    pub fn id(mut self, id: impl Into<MailId>) -> Self {
        self.id = Some(id.into());
        self
    }

    #[must_use]
    pub fn sender(mut self, sender: Option<Address>) -> Self {
        self.sender = sender;
        self
    }

    #[must_use]
    pub fn recipient(mut self, recipient: Address) -> Self {
        self.recipients.push(recipient);
        self
    }

    #[must_use]
    pub fn recipients(mut self, recipients: impl IntoIterator<Item = Address>) -> Self {
        self.recipients.extend(recipients);
        self
    }

    #[must_use]
    pub fn state(mut self, state: impl Into<State>) -> Self {
        self.state = Some(state.into());
        self
    }

    #[must_use]
    pub fn content(mut self, content: impl Into<Content>) -> Self {
        self.content = content.into();
        self
    }

    #[must_use]
    pub fn attribute(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }

    #[must_use]
    pub fn build(self) -> Mail {
        let now = SystemTime::now();
        let mut mail = Mail {
            id: self.id.unwrap_or_else(MailId::generate),
            sender: self.sender,
            recipients: Vec::with_capacity(self.recipients.len()),
            state: self.state.unwrap_or_default(),
            error_message: None,
            content: self.content,
            attributes: self.attributes,
            last_updated: now,
            arrived_at: now,
        };
        mail.set_recipients(self.recipients);
        mail
    }
}
