#![allow(clippy::expect_used, clippy::unwrap_used)]

use std::{sync::Arc, time::Duration};

use postern_common::{Address, Content, Mail, MailId, State};
use postern_spool::{
    BackingStore, FileBackingStore, MailQueue, QueueConfig, SpoolEntry, SpoolError,
    ValidationError,
};
use pretty_assertions::assert_eq;
use tempfile::TempDir;

fn file_store() -> (TempDir, FileBackingStore) {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let store = FileBackingStore::builder()
        .path(dir.path())
        .build()
        .expect("Failed to build store");
    store.init().expect("Failed to init store");
    (dir, store)
}

fn sample_mail(id: &str) -> Mail {
    let mut mail = Mail::builder()
        .id(id)
        .sender(Some("sender@example.org".parse().expect("sender")))
        .recipients([
            "a@x".parse::<Address>().expect("rcpt"),
            "b@y".parse::<Address>().expect("rcpt"),
        ])
        .state("transport")
        .content(b"Subject: hello\r\n\r\nworld\r\n".as_slice())
        .attribute("org.postern.origin", "submission")
        .build();
    mail.set_error_message("earlier failure");
    mail
}

#[tokio::test]
#[cfg_attr(miri, ignore = "Calls an unsupported method")]
async fn test_round_trip_preserves_envelope_and_content() {
    let (_dir, store) = file_store();
    let mail = sample_mail("m1");

    store
        .write(&SpoolEntry::new(mail.clone(), None))
        .await
        .expect("Failed to write");

    let read = store.read(mail.id()).await.expect("Failed to read").mail;

    assert_eq!(read.id(), mail.id());
    assert_eq!(read.sender(), mail.sender());
    assert_eq!(read.recipients(), mail.recipients());
    assert_eq!(read.state(), mail.state());
    assert_eq!(read.error_message(), Some("earlier failure"));
    assert_eq!(read.attribute("org.postern.origin"), Some("submission"));
    assert_eq!(read.last_updated(), mail.last_updated());
    assert_eq!(read.arrived_at(), mail.arrived_at());

    assert!(matches!(read.content(), Content::File(_)));
    assert_eq!(
        &*read.content().load().await.expect("Failed to load content"),
        b"Subject: hello\r\n\r\nworld\r\n"
    );
}

#[tokio::test]
#[cfg_attr(miri, ignore = "Calls an unsupported method")]
async fn test_overwrite_keeps_lazy_content() {
    let (_dir, store) = file_store();
    store
        .write(&SpoolEntry::new(sample_mail("m1"), None))
        .await
        .expect("Failed to write");

    let mut read = store.read(&MailId::from("m1")).await.expect("Failed to read").mail;
    read.set_state(State::error());
    store
        .write(&SpoolEntry::new(read, None))
        .await
        .expect("Failed to overwrite");

    let reread = store.read(&MailId::from("m1")).await.expect("Failed to read").mail;
    assert_eq!(reread.state(), &State::error());
    assert_eq!(
        &*reread.content().load().await.expect("content"),
        b"Subject: hello\r\n\r\nworld\r\n"
    );
}

#[tokio::test]
#[cfg_attr(miri, ignore = "Calls an unsupported method")]
async fn test_remove_and_missing() {
    let (dir, store) = file_store();
    store
        .write(&SpoolEntry::new(sample_mail("m1"), None))
        .await
        .expect("Failed to write");

    store.remove(&MailId::from("m1")).await.expect("Failed to remove");
    assert!(store.list().await.expect("Failed to list").is_empty());
    assert_eq!(std::fs::read_dir(dir.path()).expect("read_dir").count(), 0);

    assert!(matches!(
        store.remove(&MailId::from("m1")).await,
        Err(SpoolError::NotFound(_))
    ));
    assert!(matches!(
        store.read(&MailId::from("m1")).await,
        Err(SpoolError::NotFound(_))
    ));
}

#[tokio::test]
#[cfg_attr(miri, ignore = "Calls an unsupported method")]
async fn test_unsafe_ids_are_refused() {
    let (_dir, store) = file_store();
    let result = store
        .write(&SpoolEntry::new(sample_mail("../escape"), None))
        .await;

    assert!(matches!(
        result,
        Err(SpoolError::Validation(ValidationError::UnsafeId(_)))
    ));
}

#[tokio::test]
#[cfg_attr(miri, ignore = "Calls an unsupported method")]
async fn test_init_cleans_orphans_and_list_ignores_strays() {
    let (dir, store) = file_store();
    store
        .write(&SpoolEntry::new(sample_mail("m1"), None))
        .await
        .expect("Failed to write");

    std::fs::write(dir.path().join("m2.bin.deleted"), b"x").expect("write");
    std::fs::write(dir.path().join(".tmp_m3.bin"), b"x").expect("write");
    std::fs::write(dir.path().join("notes.txt"), b"x").expect("write");
    std::fs::write(dir.path().join("garbage.bin"), b"not bincode").expect("write");

    store.init().expect("Failed to re-init");
    assert!(!dir.path().join("m2.bin.deleted").exists());
    assert!(!dir.path().join(".tmp_m3.bin").exists());

    let ids: Vec<_> = store
        .list()
        .await
        .expect("Failed to list")
        .into_iter()
        .map(|record| record.id)
        .collect();
    assert_eq!(ids, vec![MailId::from("m1")]);
}

#[tokio::test]
#[cfg_attr(miri, ignore = "Calls an unsupported method")]
async fn test_queue_over_file_store_survives_restart() {
    let (dir, store) = file_store();

    {
        let queue = MailQueue::new(Arc::new(store), QueueConfig::default());
        queue.store(&sample_mail("m1")).await.expect("store");
        queue
            .store_deferred(&sample_mail("m2"), Duration::from_secs(3600))
            .await
            .expect("store deferred");
    }

    let reopened = FileBackingStore::builder()
        .path(dir.path())
        .build()
        .expect("Failed to build store");
    reopened.init().expect("init");
    let queue = MailQueue::new(Arc::new(reopened), QueueConfig::default());

    assert_eq!(queue.len().await.expect("len"), 2);

    let claimed = queue
        .claim(Duration::ZERO, Duration::from_millis(100))
        .await
        .expect("claim")
        .expect("m1 is eligible");
    assert_eq!(claimed.id(), &MailId::from("m1"));
    drop(claimed);

    queue.dispose(&MailId::from("m1")).await.expect("dispose");
    assert!(
        queue
            .claim(Duration::ZERO, Duration::from_millis(100))
            .await
            .expect("claim")
            .is_none(),
        "m2 is still deferred"
    );
}
