#![allow(clippy::expect_used, clippy::unwrap_used)]

use std::{
    collections::HashMap,
    sync::Arc,
    time::{Duration, Instant},
};

use async_trait::async_trait;
use parking_lot::Mutex;
use postern_common::{Address, Mail, MailId, Signal, State};
use postern_manager::{ManagerConfig, QueueContext, SpoolManager, context::DEAD_LETTER_REASON};
use postern_processor::{
    Mailet, MailetContext, MailetError, Processor, ProcessorRouter,
    mailets::{Bounce, Null, ToProcessor},
    matchers::{All, SenderIsNull},
};
use postern_spool::{BackingStore, MailQueue, MemoryBackingStore};
use pretty_assertions::assert_eq;
use tokio::sync::{Notify, broadcast};

fn address(s: &str) -> Address {
    s.parse().expect("address")
}

fn mail(id: &str) -> Mail {
    Mail::builder()
        .id(id)
        .sender(Some(address("sender@example.com")))
        .recipient(address("rcpt@example.org"))
        .build()
}

fn config(workers: usize) -> ManagerConfig {
    ManagerConfig {
        workers,
        claim_timeout_ms: 50,
        shutdown_grace_secs: 5,
        ..ManagerConfig::default()
    }
}

async fn wait_until(what: &str, mut done: impl AsyncFnMut() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(10);
    while !done().await {
        assert!(Instant::now() < deadline, "Timed out waiting for {what}");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

/// Ghosts mail and counts how often each id was serviced
#[derive(Debug, Default)]
struct Counting {
    seen: Arc<Mutex<HashMap<MailId, usize>>>,
}

#[async_trait]
impl Mailet for Counting {
    fn info(&self) -> &str {
        "Counting"
    }

    async fn service(&self, mail: &mut Mail, _ctx: &dyn MailetContext) -> Result<(), MailetError> {
        *self.seen.lock().entry(mail.id().clone()).or_default() += 1;
        mail.set_state(State::ghost());
        Ok(())
    }
}

/// Signals that it started, then takes `delay` to ghost the mail
#[derive(Debug)]
struct Slow {
    started: Arc<Notify>,
    delay: Duration,
}

#[async_trait]
impl Mailet for Slow {
    fn info(&self) -> &str {
        "Slow"
    }

    async fn service(&self, mail: &mut Mail, _ctx: &dyn MailetContext) -> Result<(), MailetError> {
        self.started.notify_one();
        tokio::time::sleep(self.delay).await;
        mail.set_state(State::ghost());
        Ok(())
    }
}

#[derive(Debug)]
struct Failing;

#[async_trait]
impl Mailet for Failing {
    fn info(&self) -> &str {
        "Failing"
    }

    async fn service(&self, _mail: &mut Mail, _ctx: &dyn MailetContext) -> Result<(), MailetError> {
        Err(MailetError::Failed("Connection refused".to_string()))
    }
}

fn router(root: Processor, error: Processor) -> Arc<ProcessorRouter> {
    Arc::new(
        ProcessorRouter::builder()
            .processor(root)
            .processor(error)
            .build()
            .expect("router"),
    )
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[cfg_attr(miri, ignore = "Calls an unsupported method")]
async fn test_workers_dispose_every_mail_exactly_once() {
    let seen = Arc::new(Mutex::new(HashMap::new()));
    let counting = Counting { seen: seen.clone() };

    let queue = Arc::new(MailQueue::in_memory());
    for i in 0..100 {
        queue.store(&mail(&format!("m{i:03}"))).await.expect("store");
    }

    let manager = SpoolManager::new(
        queue.clone(),
        router(
            Processor::new(State::ROOT).step(All, counting),
            Processor::new(State::ERROR),
        ),
        config(3),
    );
    manager.start().expect("start");

    wait_until("every mail to be disposed", async || {
        manager.stats().disposed == 100
    })
    .await;

    assert!(manager.shutdown().await);
    assert!(queue.is_empty().await.expect("is_empty"));

    let seen = seen.lock();
    assert_eq!(seen.len(), 100);
    assert!(seen.values().all(|count| *count == 1));

    let stats = manager.stats();
    assert_eq!(stats.claimed, 100);
    assert_eq!(stats.disposed, 100);
    assert_eq!(stats.in_flight, 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
#[cfg_attr(miri, ignore = "Calls an unsupported method")]
async fn test_shutdown_waits_for_in_flight_mail() {
    let started = Arc::new(Notify::new());
    let slow = Slow {
        started: started.clone(),
        delay: Duration::from_millis(300),
    };

    let queue = Arc::new(MailQueue::in_memory());
    queue.store(&mail("m1")).await.expect("store");

    let manager = SpoolManager::new(
        queue.clone(),
        router(
            Processor::new(State::ROOT).step(All, slow),
            Processor::new(State::ERROR),
        ),
        config(1),
    );
    manager.start().expect("start");

    started.notified().await;
    assert_eq!(manager.processor_names(), ["error", "root"]);

    let began = Instant::now();
    let drained = tokio::join!(manager.shutdown(), async {
        assert_eq!(manager.processor_names(), ["error", "root"]);
    })
    .0;

    assert!(drained);
    assert!(began.elapsed() < manager.config().shutdown_grace());
    assert!(!manager.is_active());
    assert_eq!(manager.stats().disposed, 1);
    assert!(queue.is_empty().await.expect("is_empty"));
    assert_eq!(manager.processor_names(), ["error", "root"]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
#[cfg_attr(miri, ignore = "Calls an unsupported method")]
async fn test_shutdown_abandons_mail_past_grace() {
    let started = Arc::new(Notify::new());
    let slow = Slow {
        started: started.clone(),
        delay: Duration::from_secs(3600),
    };

    let queue = Arc::new(MailQueue::in_memory());
    queue.store(&mail("m1")).await.expect("store");

    let manager = SpoolManager::new(
        queue.clone(),
        router(
            Processor::new(State::ROOT).step(All, slow),
            Processor::new(State::ERROR),
        ),
        ManagerConfig {
            shutdown_grace_secs: 0,
            ..config(1)
        },
    );
    manager.start().expect("start");
    started.notified().await;

    assert!(!manager.shutdown().await);

    // Still queued, and no longer claimed once the worker is gone
    assert_eq!(queue.len().await.expect("len"), 1);
    assert_eq!(queue.claimed(), 0);
    assert_eq!(manager.stats().disposed, 0);
}

#[tokio::test]
#[cfg_attr(miri, ignore = "Calls an unsupported method")]
async fn test_stalled_mail_is_parked() {
    let queue = Arc::new(MailQueue::in_memory());
    queue.store(&mail("m1")).await.expect("store");

    let manager = SpoolManager::new(
        queue.clone(),
        router(Processor::new(State::ROOT), Processor::new(State::ERROR)),
        config(1),
    );
    manager.start().expect("start");

    wait_until("the mail to be parked", async || manager.stats().parked == 1).await;
    manager.shutdown().await;

    let records = queue.records().await.expect("records");
    assert_eq!(records.len(), 1);
    assert!(records[0].not_before.is_some());
    assert_eq!(manager.stats().disposed, 0);
}

#[tokio::test]
#[cfg_attr(miri, ignore = "Calls an unsupported method")]
async fn test_escalated_mail_reaches_dead_letter_store() {
    let queue = Arc::new(MailQueue::in_memory());
    queue.store(&mail("m1")).await.expect("store");

    let dead = Arc::new(MemoryBackingStore::new());
    let context = QueueContext::new(queue.clone())
        .with_dead_letters(Some(dead.clone() as Arc<dyn BackingStore>));

    let manager = SpoolManager::with_context(
        queue.clone(),
        router(
            Processor::new(State::ROOT).step(All, ToProcessor::new(State::ERROR)),
            Processor::new(State::ERROR).step(All, Failing),
        ),
        Arc::new(context),
        config(1),
    );
    manager.start().expect("start");

    wait_until("the mail to be disposed", async || manager.stats().disposed == 1).await;
    manager.shutdown().await;

    assert!(queue.is_empty().await.expect("is_empty"));

    let entry = dead.read(&MailId::new("m1")).await.expect("dead letter");
    assert!(entry.mail.is_ghost());
    let reason = entry.mail.attribute(DEAD_LETTER_REASON).expect("reason");
    assert!(reason.contains("Connection refused"), "{reason}");
}

#[tokio::test]
#[cfg_attr(miri, ignore = "Calls an unsupported method")]
async fn test_bounce_is_queued_and_routed() {
    let queue = Arc::new(MailQueue::in_memory());
    queue.store(&mail("m1")).await.expect("store");

    let context = QueueContext::new(queue.clone())
        .with_postmaster(Some(address("postmaster@example.org")));

    // Bounces (null sender) are dropped; everything else bounces back.
    let manager = SpoolManager::with_context(
        queue.clone(),
        router(
            Processor::new(State::ROOT)
                .step(SenderIsNull, Null)
                .step(All, Bounce::default()),
            Processor::new(State::ERROR),
        ),
        Arc::new(context),
        config(1),
    );
    manager.start().expect("start");

    wait_until("the original and its bounce to be disposed", async || {
        manager.stats().disposed == 2
    })
    .await;
    manager.shutdown().await;

    assert!(queue.is_empty().await.expect("is_empty"));
}

#[tokio::test]
#[cfg_attr(miri, ignore = "Calls an unsupported method")]
async fn test_serve_stops_on_shutdown_signal() {
    let queue = Arc::new(MailQueue::in_memory());
    let manager = SpoolManager::new(
        queue,
        router(
            Processor::new(State::ROOT).step(All, Null),
            Processor::new(State::ERROR),
        ),
        config(2),
    );

    let (sender, receiver) = broadcast::channel(4);

    let serving = manager.serve(receiver);
    let signalling = async {
        wait_until("the manager to start", async || manager.is_active()).await;
        sender.send(Signal::Shutdown).expect("send");
    };

    let (served, ()) = tokio::join!(serving, signalling);
    served.expect("serve");

    assert!(!manager.is_active());
    assert!(manager.queue().is_closed());
}
