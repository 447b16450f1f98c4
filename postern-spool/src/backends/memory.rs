use std::sync::{Arc, RwLock};

use ahash::AHashMap;
use async_trait::async_trait;
use postern_common::MailId;

use crate::{
    SpoolError,
    record::{SpoolEntry, SpoolRecord, sort_by_arrival},
    r#trait::BackingStore,
};

/// In-memory backing store implementation
///
/// Entries live in a map protected by an `RwLock`. Content is kept inline, so
/// nothing survives a restart. Intended for tests and transient deployments.
///
/// # Capacity Management
/// A capacity limit makes writes of *new* ids fail once the store is full.
/// Overwriting an existing id always succeeds.
#[derive(Debug, Clone, Default)]
pub struct MemoryBackingStore {
    entries: Arc<RwLock<AHashMap<MailId, SpoolEntry>>>,
    /// Maximum number of mails to store (None = unlimited)
    capacity: Option<usize>,
}

impl MemoryBackingStore {
    /// Create a new empty memory-backed store with unlimited capacity
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a new memory-backed store with a capacity limit
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: Arc::default(),
            capacity: Some(capacity),
        }
    }

    /// Get the current number of mails in the store
    ///
    /// Recovers gracefully if the lock is poisoned by accessing the underlying data.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[must_use]
    pub const fn capacity(&self) -> Option<usize> {
        self.capacity
    }
}

#[async_trait]
impl BackingStore for MemoryBackingStore {
    async fn write(&self, entry: &SpoolEntry) -> crate::Result<()> {
        let mut entries = self.entries.write()?;

        if let Some(capacity) = self.capacity
            && !entries.contains_key(entry.mail.id())
            && entries.len() >= capacity
        {
            return Err(SpoolError::CapacityExceeded {
                len: entries.len(),
                capacity,
            });
        }

        entries.insert(entry.mail.id().clone(), entry.clone());
        Ok(())
    }

    async fn read(&self, id: &MailId) -> crate::Result<SpoolEntry> {
        self.entries
            .read()?
            .get(id)
            .cloned()
            .ok_or_else(|| SpoolError::NotFound(id.clone()))
    }

    async fn remove(&self, id: &MailId) -> crate::Result<()> {
        self.entries
            .write()?
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| SpoolError::NotFound(id.clone()))
    }

    async fn list(&self) -> crate::Result<Vec<SpoolRecord>> {
        let mut records: Vec<_> = self.entries.read()?.values().map(SpoolEntry::record).collect();
        sort_by_arrival(&mut records);
        Ok(records)
    }
}
