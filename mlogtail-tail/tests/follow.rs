//! Following a log file end to end: replay, live tail and rotation feeding the
//! counter store.
#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::{
    io::Write,
    path::Path,
    sync::Arc,
    time::{Duration, Instant},
};

use mlogtail_stats::{Classifier, CounterName, CounterStore, LogFormat, Snapshot};
use mlogtail_tail::{Aggregator, TailConfig, TailSource};
use pretty_assertions::assert_eq;

fn line(subsystem: &str, payload: &str) -> String {
    format!("Oct 19 10:00:00 mx postfix/{subsystem}[100]: {payload}\n")
}

fn accepted(size: u64) -> String {
    line(
        "qmgr",
        &format!("ABCDEF0123: from=<a@example.org>, size={size}, nrcpt=1 (queue active)"),
    )
}

fn delivered() -> String {
    line(
        "local",
        "ABCDEF0123: to=<b@example.org>, relay=local, dsn=2.0.0, status=sent (delivered to mailbox)",
    )
}

fn deferred() -> String {
    line(
        "smtp",
        "ABCDEF0123: to=<c@example.com>, relay=none, dsn=4.4.1, status=deferred (connection timed out)",
    )
}

fn noise() -> String {
    line("smtpd", "connect from unknown[192.0.2.1]")
}

fn append(path: &Path, text: &str) {
    let mut file = std::fs::OpenOptions::new()
        .append(true)
        .create(true)
        .open(path)
        .unwrap();
    file.write_all(text.as_bytes()).unwrap();
}

fn aggregator() -> Aggregator {
    Aggregator::new(
        Arc::new(CounterStore::new()),
        Arc::new(Classifier::new(LogFormat::Postfix).unwrap()),
    )
}

fn config() -> TailConfig {
    TailConfig {
        poll_interval: Duration::from_millis(10),
        progress_every: 2,
    }
}

async fn wait_for(store: &CounterStore, done: impl Fn(&Snapshot) -> bool) -> Snapshot {
    let deadline = Instant::now() + Duration::from_secs(5);
    loop {
        let snapshot = store.snapshot();
        if done(&snapshot) || Instant::now() > deadline {
            return snapshot;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

#[tokio::test]
async fn test_totals_match_independent_classification_in_any_order() {
    let classifier = Classifier::new(LogFormat::Postfix).unwrap();
    let lines = [
        accepted(100),
        accepted(250),
        delivered(),
        deferred(),
        noise(),
        delivered(),
        accepted(7),
    ];

    let mut expected = [0u64; CounterName::COUNT];
    for line in &lines {
        if let Some(outcome) = classifier.classify(line) {
            for (name, delta) in outcome.deltas() {
                expected[name.index()] += delta;
            }
        }
    }

    let forward = aggregator();
    forward
        .ingest_reader(lines.concat().as_bytes())
        .await
        .unwrap();

    let backward = aggregator();
    let reversed: String = lines.iter().rev().map(String::as_str).collect();
    backward.ingest_reader(reversed.as_bytes()).await.unwrap();

    let forward = forward.store().snapshot();
    let backward = backward.store().snapshot();
    assert_eq!(forward, backward);
    for name in CounterName::ALL {
        assert_eq!(forward[name], expected[name.index()], "{name}");
    }
    assert_eq!(forward[CounterName::BytesReceived], 357);
}

#[tokio::test]
async fn test_replay_then_follow_counts_each_line_once() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("mail.log");
    append(&path, &[accepted(10), accepted(20), delivered(), noise()].concat());

    let aggregator = aggregator();
    let source = TailSource::open(&path, config()).await.unwrap();

    // written after the tail opened: belongs to the live follow only
    append(&path, &accepted(30));

    let replayed = aggregator.replay(&source, config().progress_every).await.unwrap();
    assert_eq!(replayed, 4);
    assert_eq!(aggregator.store().value(CounterName::Received), 2);

    let runner = {
        let aggregator = aggregator.clone();
        tokio::spawn(async move { aggregator.run(source).await })
    };

    let snapshot = wait_for(aggregator.store(), |s| s[CounterName::Received] == 3).await;
    assert_eq!(snapshot[CounterName::Received], 3);
    assert_eq!(snapshot[CounterName::BytesReceived], 60);
    assert_eq!(snapshot[CounterName::Delivered], 1);

    runner.abort();
}

#[tokio::test]
async fn test_rotation_to_shorter_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("mail.log");
    append(&path, "");

    let aggregator = aggregator();
    let source = TailSource::open(&path, config()).await.unwrap();
    let runner = {
        let aggregator = aggregator.clone();
        tokio::spawn(async move { aggregator.run(source).await })
    };

    append(&path, &[accepted(1000), accepted(1000), delivered(), delivered()].concat());
    let before = wait_for(aggregator.store(), |s| s[CounterName::Delivered] == 2).await;
    assert_eq!(before[CounterName::Received], 2);

    std::fs::rename(&path, dir.path().join("mail.log.1")).unwrap();
    append(&path, &deferred());
    let during = wait_for(aggregator.store(), |s| s[CounterName::Deferred] == 1).await;
    assert_eq!(during[CounterName::Deferred], 1);

    append(&path, &accepted(5));
    let after = wait_for(aggregator.store(), |s| s[CounterName::Received] == 3).await;

    runner.abort();

    assert_eq!(after[CounterName::Received], 3);
    assert_eq!(after[CounterName::BytesReceived], 2005);
    assert_eq!(after[CounterName::Delivered], 2);
    assert_eq!(after[CounterName::Deferred], 1);
}

#[tokio::test]
async fn test_line_half_written_at_startup_is_counted_once() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("mail.log");
    let pending = accepted(40);
    let (head, tail) = pending.split_at(pending.len() / 2);
    append(&path, &[accepted(10), head.to_string()].concat());

    let aggregator = aggregator();
    let source = TailSource::open(&path, config()).await.unwrap();

    let replayed = aggregator.replay(&source, config().progress_every).await.unwrap();
    assert_eq!(replayed, 1);
    assert_eq!(aggregator.store().value(CounterName::BytesReceived), 10);

    let runner = {
        let aggregator = aggregator.clone();
        tokio::spawn(async move { aggregator.run(source).await })
    };

    append(&path, tail);
    let snapshot = wait_for(aggregator.store(), |s| s[CounterName::Received] == 2).await;

    runner.abort();

    assert_eq!(snapshot[CounterName::Received], 2);
    assert_eq!(snapshot[CounterName::BytesReceived], 50);
}
