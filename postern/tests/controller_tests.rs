#![allow(clippy::expect_used, clippy::unwrap_used)]

use std::time::{Duration, Instant};

use postern::Postern;
use postern_common::{Mail, MailId};
use postern_processor::Registry;
use pretty_assertions::assert_eq;

const SHIPPED_CONFIG: &str = include_str!("../../postern.config.ron");

fn memory_config(processors: &str) -> String {
    format!(
        r#"Postern (
            spool: (type: "Memory"),
            queue: (refresh_interval_ms: 10),
            manager: (workers: 2, claim_timeout_ms: 50, shutdown_grace_secs: 5),
            postmaster: Some("postmaster@example.com"),
            dead_letter: Some((type: "Memory")),
            processors: {processors},
        )"#
    )
}

#[test]
fn test_shipped_config_resolves() {
    let postern: Postern = ron::from_str(SHIPPED_CONFIG).expect("config");
    let router = postern
        .router(&Registry::with_builtins())
        .expect("router");

    assert_eq!(
        router.processor_names(),
        ["error", "local", "root", "spam", "transport"]
    );
    assert_eq!(router.max_dispatches(), Some(64));
    assert_eq!(
        router.processor("error").map(postern_processor::Processor::describe),
        Some(vec![
            "SenderIsNull -> ToDeadLetter".to_string(),
            "All -> Bounce".to_string()
        ])
    );
}

#[test]
fn test_unknown_mailet_is_rejected() {
    let postern: Postern = ron::from_str(&memory_config(
        r#"[(name: "root", steps: [(matcher: "All", mailet: "Teleport")]), (name: "error")]"#,
    ))
    .expect("config");

    let err = postern
        .build(&Registry::with_builtins())
        .expect_err("unknown mailet");
    assert!(err.to_string().contains("Teleport"), "{err}");
}

#[test]
fn test_relative_spool_path_is_rejected() {
    let result = ron::from_str::<Postern>(
        r#"Postern (spool: (type: "File", path: "spool"), processors: [(name: "error")])"#,
    );
    assert!(result.is_err());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
#[cfg_attr(miri, ignore = "Calls an unsupported method")]
async fn test_built_manager_drains_queue() {
    let postern: Postern = ron::from_str(&memory_config(
        r#"[
            (name: "root", steps: [
                (matcher: "HostIs=example.com", mailet: "ToProcessor", parameters: {"processor": "local"}),
                (matcher: "All", mailet: "Null"),
            ]),
            (name: "local", steps: [(matcher: "All", mailet: "Null")]),
            (name: "error"),
        ]"#,
    ))
    .expect("config");

    let manager = postern
        .build(&Registry::with_builtins())
        .expect("manager");

    for (id, rcpts) in [
        ("m1", vec!["a@example.com", "b@example.org"]),
        ("m2", vec!["c@example.com"]),
    ] {
        let mail = Mail::builder()
            .id(id)
            .recipients(rcpts.into_iter().map(|r| r.parse().expect("rcpt")))
            .build();
        manager.queue().store(&mail).await.expect("store");
    }

    manager.start().expect("start");

    let deadline = Instant::now() + Duration::from_secs(10);
    while manager.stats().disposed < 2 {
        assert!(Instant::now() < deadline, "queue was not drained");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    assert!(manager.shutdown().await);
    assert!(manager.queue().is_empty().await.expect("is_empty"));
    assert!(manager.queue().get(&MailId::new("m1")).await.expect("get").is_none());
}

#[tokio::test]
#[cfg_attr(miri, ignore = "Calls an unsupported method")]
async fn test_file_spool_survives_restart() {
    let dir = tempfile::tempdir().expect("tempdir");
    let config = format!(
        r#"Postern (
            spool: (type: "File", path: "{}"),
            manager: (workers: 1, claim_timeout_ms: 50, shutdown_grace_secs: 5),
            processors: [(name: "root"), (name: "error")],
        )"#,
        dir.path().display()
    );

    let first: Postern = ron::from_str(&config).expect("config");
    let manager = first.build(&Registry::with_builtins()).expect("manager");
    let mail = Mail::builder()
        .id("m1")
        .recipient("a@example.com".parse().expect("rcpt"))
        .content(b"Subject: hi\r\n\r\nhello\r\n".as_slice())
        .build();
    manager.queue().store(&mail).await.expect("store");
    drop(manager);

    let second: Postern = ron::from_str(&config).expect("config");
    let manager = second.build(&Registry::with_builtins()).expect("manager");
    let restored = manager
        .queue()
        .get(&MailId::new("m1"))
        .await
        .expect("get")
        .expect("mail survives restart");

    assert_eq!(restored.recipients().len(), 1);
    let content = restored.content().load().await.expect("content");
    assert_eq!(&content[..], b"Subject: hi\r\n\r\nhello\r\n");
}
