use async_trait::async_trait;
use postern_common::MailId;

use crate::record::{SpoolEntry, SpoolRecord};

/// Persistence behind a [`MailQueue`](crate::MailQueue)
///
/// Implementations only store and retrieve; claiming, eligibility and
/// wake-ups live in the queue.
#[async_trait]
pub trait BackingStore: Send + Sync + std::fmt::Debug {
    /// Insert or overwrite the entry under its mail id
    ///
    /// # Errors
    /// If the entry cannot be persisted
    async fn write(&self, entry: &SpoolEntry) -> crate::Result<()>;

    /// Read a stored entry
    ///
    /// # Errors
    /// [`SpoolError::NotFound`](crate::SpoolError::NotFound) if no such mail is stored
    async fn read(&self, id: &MailId) -> crate::Result<SpoolEntry>;

    /// Remove a stored entry
    ///
    /// # Errors
    /// [`SpoolError::NotFound`](crate::SpoolError::NotFound) if no such mail is stored
    async fn remove(&self, id: &MailId) -> crate::Result<()>;

    /// List every stored entry's record, in arrival order
    ///
    /// # Errors
    /// If the store cannot be enumerated
    async fn list(&self) -> crate::Result<Vec<SpoolRecord>>;
}
