#![allow(clippy::expect_used, clippy::unwrap_used)]

use std::{
    collections::HashSet,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use postern_common::{Address, Mail, MailId, State};
use postern_spool::MailQueue;
use pretty_assertions::assert_eq;

fn mail(id: &str, state: &str) -> Mail {
    Mail::builder()
        .id(id)
        .recipient(Address::new("user", "example.com").expect("address"))
        .state(state)
        .build()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[cfg_attr(miri, ignore = "Calls an unsupported method")]
async fn test_concurrent_claimers_never_share_a_mail() {
    let queue = Arc::new(MailQueue::in_memory());
    for i in 0..50 {
        queue
            .store(&mail(&format!("m{i:02}"), "root"))
            .await
            .expect("store");
    }

    let holders = Arc::new(AtomicUsize::new(0));
    let mut tasks = Vec::new();

    for _ in 0..8 {
        let queue = Arc::clone(&queue);
        let holders = Arc::clone(&holders);

        tasks.push(tokio::spawn(async move {
            let mut mine = Vec::new();
            while let Some(claimed) = queue
                .claim(Duration::ZERO, Duration::from_millis(200))
                .await
                .expect("claim")
            {
                holders.fetch_add(1, Ordering::SeqCst);
                assert!(holders.load(Ordering::SeqCst) <= 8);
                tokio::task::yield_now().await;

                mine.push(claimed.id().clone());
                queue.dispose(claimed.id()).await.expect("dispose");
                holders.fetch_sub(1, Ordering::SeqCst);
            }
            mine
        }));
    }

    let mut seen = HashSet::new();
    let mut total = 0;
    for task in tasks {
        for id in task.await.expect("join") {
            total += 1;
            assert!(seen.insert(id.clone()), "{id} was claimed twice");
        }
    }

    assert_eq!(total, 50);
    assert!(queue.is_empty().await.expect("is_empty"));
    assert_eq!(queue.claimed(), 0);
}

#[tokio::test]
#[cfg_attr(miri, ignore = "Calls an unsupported method")]
async fn test_held_claim_blocks_until_released() {
    let queue = Arc::new(MailQueue::in_memory());
    queue.store(&mail("m1", "root")).await.expect("store");

    let first = queue
        .claim(Duration::ZERO, Duration::from_millis(50))
        .await
        .expect("claim")
        .expect("mail");

    let waiter = {
        let queue = Arc::clone(&queue);
        tokio::spawn(async move { queue.claim(Duration::ZERO, Duration::from_secs(5)).await })
    };

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(!waiter.is_finished());

    drop(first);

    let second = waiter.await.expect("join").expect("claim");
    assert_eq!(second.map(|c| c.id().clone()), Some(MailId::from("m1")));
}

#[tokio::test]
#[cfg_attr(miri, ignore = "Calls an unsupported method")]
async fn test_error_mail_becomes_eligible_after_retry_delay() {
    let queue = MailQueue::in_memory();
    queue.store(&mail("m1", State::ERROR)).await.expect("store");

    let retry = Duration::from_millis(150);

    assert!(
        queue
            .claim(retry, Duration::from_millis(20))
            .await
            .expect("claim")
            .is_none(),
        "claimed before the retry delay elapsed"
    );

    let claimed = queue
        .claim(retry, Duration::from_secs(5))
        .await
        .expect("claim");
    assert!(claimed.is_some());

    let last_updated = claimed.as_ref().map(|c| c.mail().last_updated()).expect("mail");
    assert!(last_updated.elapsed().expect("clock") >= retry);
}

#[tokio::test]
#[cfg_attr(miri, ignore = "Calls an unsupported method")]
async fn test_active_mail_is_not_held_back_by_retry_delay() {
    let queue = MailQueue::in_memory();
    queue.store(&mail("m1", "transport")).await.expect("store");

    let claimed = queue
        .claim(Duration::from_secs(3600), Duration::from_millis(100))
        .await
        .expect("claim");
    assert!(claimed.is_some());
}

#[tokio::test]
#[cfg_attr(miri, ignore = "Calls an unsupported method")]
async fn test_restore_while_claimed_updates_record() {
    let queue = MailQueue::in_memory();
    queue.store(&mail("m1", "root")).await.expect("store");

    let (mut claimed_mail, guard) = queue
        .claim(Duration::ZERO, Duration::from_millis(50))
        .await
        .expect("claim")
        .expect("mail")
        .into_parts();

    claimed_mail.set_state("transport");
    queue.store(&claimed_mail).await.expect("store");
    drop(guard);

    let records = queue.records().await.expect("records");
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].state, State::from("transport"));
}
