//! The spool manager: a fixed pool of workers draining the mail queue
//!
//! Each worker claims one mail, routes it and everything split off from it,
//! then settles the result with the queue:
//!
//! - terminal mail is disposed,
//! - stalled mail is parked with [`MailQueue::store_deferred`],
//! - split-off mail that is not terminal is stored under its own id.
//!
//! Split-off mail is stored before the original is disposed, since it may
//! still refer to the original's content.

use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use parking_lot::Mutex;
use postern_common::{Signal, internal, outgoing};
use postern_processor::{MailetContext, ProcessorRouter, Routed};
use postern_spool::{ClaimedMail, MailQueue};
use postern_tracing::traced;
use tokio::{sync::broadcast, task::JoinSet};

use crate::{ManagerConfig, ManagerError, QueueContext, StatsSnapshot, stats::ManagerStats};

/// Owns the worker pool for one queue and one router
#[derive(Debug)]
pub struct SpoolManager {
    shared: Arc<Shared>,
    workers: Mutex<JoinSet<()>>,
}

struct Shared {
    queue: Arc<MailQueue>,
    router: Arc<ProcessorRouter>,
    context: Arc<dyn MailetContext>,
    config: ManagerConfig,
    stats: ManagerStats,
    active: AtomicBool,
}

impl std::fmt::Debug for Shared {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Shared")
            .field("router", &self.router)
            .field("config", &self.config)
            .field("stats", &self.stats)
            .field("active", &self.active)
            .finish_non_exhaustive()
    }
}

impl SpoolManager {
    /// A manager whose mailets re-inject mail into `queue`
    pub fn new(queue: Arc<MailQueue>, router: Arc<ProcessorRouter>, config: ManagerConfig) -> Self {
        let context = Arc::new(QueueContext::new(queue.clone()));
        Self::with_context(queue, router, context, config)
    }

    pub fn with_context(
        queue: Arc<MailQueue>,
        router: Arc<ProcessorRouter>,
        context: Arc<dyn MailetContext>,
        config: ManagerConfig,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                queue,
                router,
                context,
                config,
                stats: ManagerStats::default(),
                active: AtomicBool::new(false),
            }),
            workers: Mutex::new(JoinSet::new()),
        }
    }

    pub fn queue(&self) -> &Arc<MailQueue> {
        &self.shared.queue
    }

    pub fn router(&self) -> &Arc<ProcessorRouter> {
        &self.shared.router
    }

    pub fn config(&self) -> &ManagerConfig {
        &self.shared.config
    }

    /// Names of the configured processors
    pub fn processor_names(&self) -> Vec<String> {
        self.shared
            .router
            .processor_names()
            .into_iter()
            .map(ToString::to_string)
            .collect()
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.shared.stats.snapshot()
    }

    pub fn is_active(&self) -> bool {
        self.shared.active.load(Ordering::Acquire)
    }

    /// Spawn the workers
    ///
    /// # Errors
    /// If the manager is already running
    pub fn start(&self) -> crate::Result<()> {
        if self.shared.active.swap(true, Ordering::AcqRel) {
            return Err(ManagerError::AlreadyRunning);
        }

        let count = self.shared.config.workers.max(1);
        let mut workers = self.workers.lock();
        for worker in 0..count {
            let shared = self.shared.clone();
            workers.spawn(async move { shared.work(worker).await });
        }

        internal!(
            level = INFO,
            "Spool manager started with {count} worker(s), processors: {:?}",
            self.shared.router.processor_names()
        );

        Ok(())
    }

    /// Stop the workers
    ///
    /// Blocked workers are woken and exit; workers routing a mail finish it
    /// first. Returns whether every worker finished within the grace period.
    /// Mail still in flight after that is abandoned and stays queued.
    #[traced(instrument(level = tracing::Level::DEBUG, skip_all), timing(precision = "ms"))]
    pub async fn shutdown(&self) -> bool {
        self.shared.active.store(false, Ordering::Release);
        self.shared.queue.close();

        let mut workers = std::mem::take(&mut *self.workers.lock());
        let grace = self.shared.config.shutdown_grace();

        let drained = tokio::time::timeout(grace, async {
            while let Some(joined) = workers.join_next().await {
                if let Err(err) = joined {
                    internal!(level = ERROR, "Spool worker failed: {err}");
                }
            }
        })
        .await
        .is_ok();

        if !drained {
            internal!(
                level = WARN,
                "Shutdown grace of {}s exceeded, abandoning {} in-flight mail(s)",
                grace.as_secs(),
                self.shared.stats.in_flight()
            );
            workers.shutdown().await;
        }

        self.shared.router.destroy();
        internal!(level = INFO, "Spool manager stopped");

        drained
    }

    /// Run until a shutdown signal arrives, then shut down
    ///
    /// # Errors
    /// If the manager is already running
    #[traced(instrument(level = tracing::Level::TRACE, skip_all), timing(precision = "s"))]
    pub async fn serve(&self, mut shutdown: broadcast::Receiver<Signal>) -> crate::Result<()> {
        self.start()?;

        loop {
            match shutdown.recv().await {
                Ok(Signal::Shutdown | Signal::Finalised) => {
                    internal!("Spool manager received shutdown signal");
                    break;
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    internal!(level = DEBUG, "Spool manager missed {skipped} signal(s)");
                }
                Err(broadcast::error::RecvError::Closed) => {
                    internal!(level = WARN, "Shutdown channel closed, stopping");
                    break;
                }
            }
        }

        self.shutdown().await;
        Ok(())
    }
}

impl Shared {
    async fn work(&self, worker: usize) {
        internal!(level = DEBUG, "Spool worker {worker} running");

        let retry_delay = self.config.retry_delay();
        let claim_timeout = self.config.claim_timeout();

        while self.active.load(Ordering::Acquire) && !self.queue.is_closed() {
            match self.queue.claim(retry_delay, claim_timeout).await {
                Ok(Some(claimed)) => self.process(claimed).await,
                Ok(None) => {}
                Err(err) => {
                    self.stats.record_failed();
                    internal!(level = ERROR, "Spool worker {worker} failed to claim mail: {err}");
                    tokio::time::sleep(claim_timeout.min(Duration::from_secs(1))).await;
                }
            }
        }

        internal!(level = DEBUG, "Spool worker {worker} stopped");
    }

    #[traced(instrument(level = tracing::Level::DEBUG, skip_all, fields(id = %claimed.id())), timing(precision = "ms"))]
    async fn process(&self, claimed: ClaimedMail) {
        let _in_flight = self.stats.begin();
        let (mail, _claim) = claimed.into_parts();
        let id = mail.id().clone();

        let report = self.router.route(mail, self.context.as_ref()).await;

        for child in report.children {
            self.settle_child(child).await;
        }

        if report.mail.is_terminal() {
            match self.queue.dispose(&id).await {
                Ok(_) => self.stats.record_disposed(),
                Err(err) => {
                    self.stats.record_failed();
                    outgoing!(level = ERROR, "Unable to dispose of mail {id}: {err}");
                }
            }
        } else {
            self.park(&report.mail).await;
        }
    }

    async fn settle_child(&self, child: Routed) {
        if child.is_terminal() {
            outgoing!(level = DEBUG, "Split-off mail {} finished", child.mail.id());
            return;
        }

        self.park(&child).await;
    }

    async fn park(&self, routed: &Routed) {
        let mail = &routed.mail;
        match self
            .queue
            .store_deferred(mail, self.config.park_delay())
            .await
        {
            Ok(()) => {
                self.stats.record_parked();
                internal!(
                    level = DEBUG,
                    "Parked mail {} in state {} after {} dispatch(es)",
                    mail.id(),
                    mail.state(),
                    routed.dispatches
                );
            }
            Err(err) => {
                self.stats.record_failed();
                internal!(level = ERROR, "Unable to park mail {}: {err}", mail.id());
            }
        }
    }
}
