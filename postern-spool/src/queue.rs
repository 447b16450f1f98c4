//! The mail queue: a backing store plus exclusive claims and deferred retry
//!
//! Claimers scan a cached snapshot of [`SpoolRecord`]s in arrival order and
//! take the first eligible one that nobody else holds. The snapshot is
//! refreshed from the store at most once per refresh interval, or sooner
//! after a [`MailQueue::store`]. When nothing is eligible a claimer sleeps
//! until a store wakes it, the earliest deferred record becomes eligible, or
//! (if the snapshot is incomplete) the next refresh is allowed.

use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::{Duration, SystemTime},
};

use dashmap::{DashMap, mapref::entry::Entry};
use parking_lot::Mutex;
use postern_common::{Mail, MailId, incoming, internal, outgoing};
use postern_tracing::traced;
use tokio::{sync::Notify, time::Instant};

use crate::{
    QueueConfig,
    backends::MemoryBackingStore,
    record::{SpoolEntry, SpoolRecord},
    r#trait::BackingStore,
};

#[derive(Debug)]
struct Pending {
    records: Vec<SpoolRecord>,
    refreshed_at: Option<Instant>,
    interval: Duration,
    failures: u32,
    dirty: bool,
    truncated: bool,
}

impl Pending {
    fn refresh_due(&self, now: Instant) -> bool {
        self.refreshed_at.is_none_or(|at| {
            now >= at + self.interval || (self.dirty && self.failures == 0)
        })
    }

    /// When the cache is known to be incomplete or stale, the next time it may be refreshed
    fn next_refresh(&self) -> Option<Instant> {
        if self.truncated || self.dirty {
            self.refreshed_at.map(|at| at + self.interval)
        } else {
            None
        }
    }

    fn forget(&mut self, id: &MailId) {
        self.records.retain(|record| record.id != *id);
    }

    fn replace(&mut self, record: SpoolRecord) {
        if let Some(existing) = self.records.iter_mut().find(|r| r.id == record.id) {
            *existing = record;
        }
    }
}

enum Scan {
    Claimed(ClaimGuard),
    Wait {
        next_eligible: Option<SystemTime>,
        next_refresh: Option<Instant>,
    },
}

/// Exclusive ownership of one queued mail
///
/// Dropping the guard releases the claim, on success and failure paths alike.
#[derive(Debug)]
#[must_use = "dropping the guard releases the claim immediately"]
pub struct ClaimGuard {
    id: MailId,
    claims: Arc<DashMap<MailId, ()>>,
    notify: Arc<Notify>,
}

impl ClaimGuard {
    pub const fn id(&self) -> &MailId {
        &self.id
    }
}

impl Drop for ClaimGuard {
    fn drop(&mut self) {
        self.claims.remove(&self.id);
        self.notify.notify_waiters();
    }
}

/// A mail claimed from the queue, together with its claim
#[derive(Debug)]
pub struct ClaimedMail {
    mail: Mail,
    guard: ClaimGuard,
}

impl ClaimedMail {
    pub const fn id(&self) -> &MailId {
        self.guard.id()
    }

    pub const fn mail(&self) -> &Mail {
        &self.mail
    }

    pub const fn mail_mut(&mut self) -> &mut Mail {
        &mut self.mail
    }

    /// Split into the mail and the guard holding its claim
    pub fn into_parts(self) -> (Mail, ClaimGuard) {
        (self.mail, self.guard)
    }
}

/// Durable queue of in-flight mail with exclusive claims
#[derive(Debug)]
pub struct MailQueue {
    store: Arc<dyn BackingStore>,
    config: QueueConfig,
    claims: Arc<DashMap<MailId, ()>>,
    pending: Mutex<Pending>,
    refresh_gate: tokio::sync::Mutex<()>,
    notify: Arc<Notify>,
    closed: AtomicBool,
}

impl MailQueue {
    #[must_use]
    pub fn new(store: Arc<dyn BackingStore>, config: QueueConfig) -> Self {
        let pending = Pending {
            records: Vec::new(),
            refreshed_at: None,
            interval: config.refresh_interval(),
            failures: 0,
            dirty: true,
            truncated: false,
        };

        Self {
            store,
            config,
            claims: Arc::default(),
            pending: Mutex::new(pending),
            refresh_gate: tokio::sync::Mutex::new(()),
            notify: Arc::default(),
            closed: AtomicBool::new(false),
        }
    }

    /// A queue over an unbounded in-memory store, with default tuning
    #[must_use]
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryBackingStore::new()), QueueConfig::default())
    }

    pub const fn config(&self) -> &QueueConfig {
        &self.config
    }

    pub fn store_handle(&self) -> Arc<dyn BackingStore> {
        Arc::clone(&self.store)
    }

    /// Insert or overwrite a mail, making it visible to claimers immediately
    ///
    /// `last_updated` is stamped on the stored copy.
    ///
    /// # Errors
    /// If the backing store rejects the write
    pub async fn store(&self, mail: &Mail) -> crate::Result<()> {
        self.write(mail, None).await
    }

    /// Store a mail that may not be claimed before `delay` has passed
    ///
    /// # Errors
    /// If the backing store rejects the write
    pub async fn store_deferred(&self, mail: &Mail, delay: Duration) -> crate::Result<()> {
        self.write(mail, SystemTime::now().checked_add(delay)).await
    }

    async fn write(&self, mail: &Mail, not_before: Option<SystemTime>) -> crate::Result<()> {
        let mut mail = mail.clone();
        mail.touch();
        let id = mail.id().clone();

        self.store.write(&SpoolEntry::new(mail, not_before)).await?;
        self.pending.lock().dirty = true;
        self.notify.notify_waiters();

        incoming!(level = DEBUG, "Queued mail {id}");
        Ok(())
    }

    /// Claim exactly one eligible mail.
    ///
    /// Mail in the error state only becomes eligible `retry_delay` after it
    /// was last stored. Returns `None` when `timeout` elapses or the queue is
    /// closed. A mail is never handed to two holders at once.
    ///
    /// # Errors
    /// If a claimed mail cannot be read back from the store
    #[traced(instrument(level = tracing::Level::TRACE, skip(self)), timing(precision = "ms"))]
    pub async fn claim(
        &self,
        retry_delay: Duration,
        timeout: Duration,
    ) -> crate::Result<Option<ClaimedMail>> {
        let deadline = Instant::now() + timeout;

        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if self.is_closed() {
                return Ok(None);
            }

            self.refresh_if_due().await;

            let (next_eligible, next_refresh) = match self.scan(retry_delay) {
                Scan::Claimed(guard) => {
                    if let Some(claimed) = self.load_claimed(guard, retry_delay).await? {
                        return Ok(Some(claimed));
                    }
                    continue;
                }
                Scan::Wait {
                    next_eligible,
                    next_refresh,
                } => (next_eligible, next_refresh),
            };

            if Instant::now() >= deadline {
                return Ok(None);
            }

            let mut wake = deadline;
            if let Some(at) = next_eligible.and_then(instant_at) {
                wake = wake.min(at);
            }
            // A refresh already overdue is in progress elsewhere; it notifies when done.
            if let Some(at) = next_refresh
                && at > Instant::now()
            {
                wake = wake.min(at);
            }

            tokio::select! {
                () = notified.as_mut() => {}
                () = tokio::time::sleep_until(wake) => {}
            }
        }
    }

    /// Remove a mail from the queue.
    ///
    /// Returns whether the mail was present; removing an absent mail is not an error.
    ///
    /// # Errors
    /// If the backing store fails for any reason other than the mail being absent
    pub async fn dispose(&self, id: &MailId) -> crate::Result<bool> {
        let removed = match self.store.remove(id).await {
            Ok(()) => true,
            Err(err) if err.is_not_found() => false,
            Err(err) => return Err(err),
        };

        self.pending.lock().forget(id);

        if removed {
            outgoing!(level = DEBUG, "Disposed mail {id}");
        }

        Ok(removed)
    }

    /// Read a queued mail without claiming it
    ///
    /// # Errors
    /// If the backing store fails for any reason other than the mail being absent
    pub async fn get(&self, id: &MailId) -> crate::Result<Option<Mail>> {
        match self.store.read(id).await {
            Ok(entry) => Ok(Some(entry.mail)),
            Err(err) if err.is_not_found() => Ok(None),
            Err(err) => Err(err),
        }
    }

    /// Every record currently stored, in arrival order
    ///
    /// # Errors
    /// If the backing store cannot be listed
    pub async fn records(&self) -> crate::Result<Vec<SpoolRecord>> {
        self.store.list().await
    }

    /// Number of mails currently stored
    ///
    /// # Errors
    /// If the backing store cannot be listed
    pub async fn len(&self) -> crate::Result<usize> {
        Ok(self.store.list().await?.len())
    }

    /// # Errors
    /// If the backing store cannot be listed
    pub async fn is_empty(&self) -> crate::Result<bool> {
        Ok(self.len().await? == 0)
    }

    /// Number of mails currently claimed
    pub fn claimed(&self) -> usize {
        self.claims.len()
    }

    /// Stop handing out mail and wake every blocked claimer
    pub fn close(&self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            internal!(level = INFO, "Mail queue closed");
        }
        self.notify.notify_waiters();
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Refresh the pending cache if it is due and nobody else is refreshing it
    async fn refresh_if_due(&self) {
        if !self.pending.lock().refresh_due(Instant::now()) {
            return;
        }

        let Ok(_gate) = self.refresh_gate.try_lock() else {
            return;
        };

        self.pending.lock().dirty = false;
        let listed = self.store.list().await;

        let mut pending = self.pending.lock();
        pending.refreshed_at = Some(Instant::now());

        match listed {
            Ok(mut records) => {
                pending.truncated = records.len() > self.config.max_pending;
                records.truncate(self.config.max_pending);
                pending.records = records;
                pending.interval = self.config.refresh_interval();
                pending.failures = 0;
            }
            Err(err) => {
                pending.dirty = true;
                pending.failures = pending.failures.saturating_add(1);
                pending.interval = pending
                    .interval
                    .saturating_mul(2)
                    .min(self.config.max_refresh_backoff());
                internal!(
                    level = WARN,
                    "Failed to refresh pending mail (attempt {}), next refresh in {:?}: {err}",
                    pending.failures,
                    pending.interval
                );
            }
        }

        drop(pending);
        self.notify.notify_waiters();
    }

    fn scan(&self, retry_delay: Duration) -> Scan {
        let now = SystemTime::now();
        let pending = self.pending.lock();
        let mut next_eligible: Option<SystemTime> = None;

        for record in &pending.records {
            if self.claims.contains_key(&record.id) {
                continue;
            }

            match record.eligible_at(&self.config.error_state, retry_delay) {
                Some(at) if at <= now => {
                    if let Some(guard) = self.try_claim(&record.id) {
                        return Scan::Claimed(guard);
                    }
                }
                Some(at) => {
                    next_eligible = Some(next_eligible.map_or(at, |next| next.min(at)));
                }
                None => {}
            }
        }

        Scan::Wait {
            next_eligible,
            next_refresh: pending.next_refresh(),
        }
    }

    fn try_claim(&self, id: &MailId) -> Option<ClaimGuard> {
        match self.claims.entry(id.clone()) {
            Entry::Occupied(_) => None,
            Entry::Vacant(vacant) => {
                vacant.insert(());
                Some(ClaimGuard {
                    id: id.clone(),
                    claims: Arc::clone(&self.claims),
                    notify: Arc::clone(&self.notify),
                })
            }
        }
    }

    /// Read the mail behind a won claim, re-checking eligibility against the
    /// stored copy since the cached record may be stale.
    async fn load_claimed(
        &self,
        guard: ClaimGuard,
        retry_delay: Duration,
    ) -> crate::Result<Option<ClaimedMail>> {
        match self.store.read(guard.id()).await {
            Ok(entry) => {
                let record = entry.record();
                if record.is_eligible(&self.config.error_state, retry_delay, SystemTime::now()) {
                    internal!(level = DEBUG, "Claimed mail {}", guard.id());
                    Ok(Some(ClaimedMail {
                        mail: entry.mail,
                        guard,
                    }))
                } else {
                    self.pending.lock().replace(record);
                    Ok(None)
                }
            }
            Err(err) => {
                self.pending.lock().forget(guard.id());
                if err.is_not_found() { Ok(None) } else { Err(err) }
            }
        }
    }
}

/// Convert a wall-clock deadline into a monotonic one
fn instant_at(at: SystemTime) -> Option<Instant> {
    let wait = at.duration_since(SystemTime::now()).unwrap_or_default();
    Instant::now().checked_add(wait)
}
