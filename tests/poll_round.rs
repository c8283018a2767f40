//! Poll round behaviour through the engine API.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{engine, target, test_config, FaultyRegistry, RecordingTransport, Script, StubFingerprinter};
use site_watcher::lifecycle::Shutdown;
use site_watcher::monitor::RoundSummary;
use site_watcher::registry::{MemoryRegistry, SiteRegistry, Target};

const A: &str = "https://a.example/";
const B: &str = "https://b.example/";
const C: &str = "https://c.example/";

fn find<'a>(targets: &'a [Target], url: &str) -> &'a Target {
    targets.iter().find(|t| t.url == url).unwrap()
}

#[tokio::test(start_paused = true)]
async fn test_first_seen_stores_hash_without_notifying() {
    let registry = Arc::new(MemoryRegistry::new(vec![target(A, "")]));
    let fetcher = StubFingerprinter::new(Duration::from_millis(50));
    fetcher.hash(A, "h1");
    let transport = RecordingTransport::new();
    let (engine, _) = engine(&test_config(), registry.clone(), fetcher, transport.clone());

    let summary = engine.run_once().await.unwrap();

    assert_eq!(summary.succeeded, 1);
    assert_eq!(summary.notified, 0);
    assert!(transport.sent().is_empty());

    let saved = registry.snapshot();
    assert_eq!(saved[0].content_hash, "h1");
    assert!(saved[0].last_checked_at.is_some());
    assert!(saved[0].last_notified_at.is_none());
}

#[tokio::test(start_paused = true)]
async fn test_unchanged_only_moves_checked_time() {
    let registry = Arc::new(MemoryRegistry::new(vec![target(A, "h1")]));
    let fetcher = StubFingerprinter::new(Duration::from_millis(50));
    fetcher.hash(A, "h1");
    let transport = RecordingTransport::new();
    let (engine, _) = engine(&test_config(), registry.clone(), fetcher, transport.clone());

    let summary = engine.run_once().await.unwrap();

    assert_eq!(summary.succeeded, 1);
    assert!(transport.sent().is_empty());
    let saved = &registry.snapshot()[0];
    assert_eq!(saved.content_hash, "h1");
    assert!(saved.last_checked_at.is_some());
    assert!(saved.last_notified_at.is_none());
}

#[tokio::test(start_paused = true)]
async fn test_one_change_among_three_sends_one_email() {
    let registry = Arc::new(MemoryRegistry::new(vec![
        target(A, "ha"),
        target(B, "hb"),
        target(C, "hc"),
    ]));
    let fetcher = StubFingerprinter::new(Duration::from_millis(50));
    fetcher.hash(A, "ha");
    fetcher.hash(B, "hb-new");
    fetcher.hash(C, "hc");
    let transport = RecordingTransport::new();
    let (engine, metrics) = engine(&test_config(), registry.clone(), fetcher, transport.clone());

    let summary = engine.run_once().await.unwrap();

    assert_eq!(
        summary,
        RoundSummary {
            succeeded: 3,
            skipped: 0,
            failed: 0,
            notified: 1,
        }
    );

    let sent = transport.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].to, "owner@example.com");
    assert!(sent[0].subject.contains(B));

    let saved = registry.snapshot();
    assert_eq!(find(&saved, A).content_hash, "ha");
    assert_eq!(find(&saved, B).content_hash, "hb-new");
    assert!(find(&saved, B).last_notified_at.is_some());
    assert_eq!(find(&saved, C).content_hash, "hc");

    let health = engine.health();
    assert_eq!(health.total_checks, 3);
    assert_eq!(health.emails_sent, 1);
    assert_eq!(metrics.snapshot().emails_failed, 0);
    assert!(health.last_round_at.is_some());
}

#[tokio::test(start_paused = true)]
async fn test_failed_notification_keeps_hash_for_next_round() {
    let registry = Arc::new(MemoryRegistry::new(vec![target(A, "old")]));
    let fetcher = StubFingerprinter::new(Duration::from_millis(50));
    fetcher.hash(A, "new");
    let transport = RecordingTransport::new();
    transport.set_failing(true);
    let (engine, _) = engine(&test_config(), registry.clone(), fetcher, transport.clone());

    let summary = engine.run_once().await.unwrap();
    assert_eq!(summary.failed, 1);
    assert_eq!(transport.attempts(), 3);

    let saved = registry.snapshot();
    assert_eq!(saved[0].content_hash, "old");
    assert!(saved[0].last_checked_at.is_some());
    assert!(saved[0].last_notified_at.is_none());
    assert_eq!(saved[0].notify_failures, 1);

    transport.set_failing(false);
    let summary = engine.run_once().await.unwrap();
    assert_eq!(summary.notified, 1);

    let saved = registry.snapshot();
    assert_eq!(saved[0].content_hash, "new");
    assert_eq!(saved[0].notify_failures, 0);
    assert_eq!(transport.sent().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_change_accepted_after_notify_failure_cap() {
    let mut config = test_config();
    config.monitor.max_notify_failures = Some(2);
    let registry = Arc::new(MemoryRegistry::new(vec![target(A, "old")]));
    let fetcher = StubFingerprinter::new(Duration::from_millis(50));
    fetcher.hash(A, "new");
    let transport = RecordingTransport::new();
    transport.set_failing(true);
    let (engine, _) = engine(&config, registry.clone(), fetcher, transport.clone());

    engine.run_once().await.unwrap();
    assert_eq!(registry.snapshot()[0].content_hash, "old");

    engine.run_once().await.unwrap();
    let saved = &registry.snapshot()[0];
    assert_eq!(saved.content_hash, "new");
    assert_eq!(saved.notify_failures, 0);
}

#[tokio::test(start_paused = true)]
async fn test_concurrency_never_exceeds_gate() {
    let targets: Vec<Target> = (0..12)
        .map(|i| target(&format!("https://site{i}.example/"), "h"))
        .collect();
    let fetcher = StubFingerprinter::new(Duration::from_millis(200));
    for t in &targets {
        fetcher.hash(&t.url, "h");
    }
    let registry = Arc::new(MemoryRegistry::new(targets));
    let (engine, _) = engine(&test_config(), registry, fetcher.clone(), RecordingTransport::new());

    let summary = engine.run_once().await.unwrap();

    assert_eq!(summary.succeeded, 12);
    assert_eq!(fetcher.calls(), 12);
    assert_eq!(fetcher.max_in_flight(), 5);
}

#[tokio::test(start_paused = true)]
async fn test_panicking_target_does_not_affect_others() {
    let registry = Arc::new(MemoryRegistry::new(vec![
        target(A, "ha"),
        target(B, "hb"),
        target(C, ""),
    ]));
    let fetcher = StubFingerprinter::new(Duration::from_millis(50));
    fetcher.hash(A, "ha");
    fetcher.script(B, Script::Panic);
    fetcher.hash(C, "hc");
    let (engine, _) = engine(&test_config(), registry.clone(), fetcher, RecordingTransport::new());

    let summary = engine.run_once().await.unwrap();

    assert_eq!(summary.succeeded, 2);
    assert_eq!(summary.failed, 1);
    assert_eq!(summary.total(), 3);

    let saved = registry.snapshot();
    assert_eq!(find(&saved, B).content_hash, "hb");
    assert!(find(&saved, B).last_checked_at.is_none());
    assert_eq!(find(&saved, C).content_hash, "hc");
}

#[tokio::test(start_paused = true)]
async fn test_all_timeouts_still_save_without_touching_targets() {
    let targets = vec![target(A, "ha"), target(B, "hb"), target(C, "hc")];
    let registry = FaultyRegistry::new(targets.clone());
    let fetcher = StubFingerprinter::new(Duration::ZERO);
    for t in &targets {
        fetcher.script(&t.url, Script::Hang);
    }
    let (engine, metrics) = engine(&test_config(), registry.clone(), fetcher, RecordingTransport::new());

    let summary = engine.run_once().await.unwrap();

    assert_eq!(summary.failed, 3);
    assert_eq!(registry.inner.save_count(), 1);
    assert!(registry
        .inner
        .snapshot()
        .iter()
        .all(|t| t.last_checked_at.is_none()));
    assert_eq!(metrics.snapshot().failed_checks, 3);
}

#[tokio::test(start_paused = true)]
async fn test_open_breaker_skips_without_fetching() {
    let registry = Arc::new(MemoryRegistry::new(vec![target(A, "ha")]));
    let fetcher = StubFingerprinter::new(Duration::from_millis(10));
    fetcher.script(A, Script::Fail);
    let (engine, _) = engine(&test_config(), registry, fetcher.clone(), RecordingTransport::new());

    for _ in 0..3 {
        assert_eq!(engine.run_once().await.unwrap().failed, 1);
    }
    assert_eq!(engine.health().open_breaker_count, 1);

    let summary = engine.run_once().await.unwrap();
    assert_eq!(summary.skipped, 1);
    assert_eq!(fetcher.calls(), 3);
    assert_eq!(engine.health().total_checks, 3);
    assert_eq!(engine.health().failed_checks, 3);
}

#[tokio::test(start_paused = true)]
async fn test_cancellation_persists_resolved_subset() {
    let registry = Arc::new(MemoryRegistry::new(vec![
        target(A, ""),
        target(B, ""),
        target(C, ""),
    ]));
    let fetcher = StubFingerprinter::new(Duration::from_millis(10));
    fetcher.hash(A, "ha");
    fetcher.script(B, Script::Hang);
    fetcher.script(C, Script::Hang);
    let (engine, _) = engine(&test_config(), registry.clone(), fetcher, RecordingTransport::new());

    let shutdown = Shutdown::new();
    let signal = shutdown.subscribe();
    let round = tokio::spawn({
        let engine = engine.clone();
        async move { engine.run_round(&signal).await }
    });

    tokio::time::sleep(Duration::from_millis(100)).await;
    shutdown.trigger();
    let summary = round.await.unwrap().unwrap();

    assert_eq!(summary.succeeded, 1);
    assert_eq!(summary.skipped, 2);

    let saved = registry.snapshot();
    assert_eq!(find(&saved, A).content_hash, "ha");
    assert!(find(&saved, B).content_hash.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_failed_save_keeps_results_for_next_round() {
    let registry = FaultyRegistry::new(vec![target(A, "")]);
    registry.fail_saves(true);
    let fetcher = StubFingerprinter::new(Duration::from_millis(10));
    fetcher.hash(A, "ha");
    let (engine, _) = engine(&test_config(), registry.clone(), fetcher, RecordingTransport::new());

    engine.run_once().await.unwrap();
    assert!(registry.inner.snapshot()[0].content_hash.is_empty());

    registry.fail_saves(false);
    let summary = engine.run_once().await.unwrap();

    assert_eq!(summary.succeeded, 1);
    assert_eq!(registry.inner.snapshot()[0].content_hash, "ha");
}

#[tokio::test(start_paused = true)]
async fn test_targets_registered_during_round_survive_save() {
    let registry = Arc::new(MemoryRegistry::new(vec![target(A, "")]));
    let fetcher = StubFingerprinter::new(Duration::from_secs(2));
    fetcher.hash(A, "ha");
    let (engine, _) = engine(&test_config(), registry.clone(), fetcher, RecordingTransport::new());

    let round = tokio::spawn({
        let engine = engine.clone();
        async move { engine.run_once().await }
    });

    tokio::time::sleep(Duration::from_millis(500)).await;
    registry.replace(vec![target(A, ""), target(B, "")]);
    round.await.unwrap().unwrap();

    let saved = registry.snapshot();
    assert_eq!(saved.len(), 2);
    assert_eq!(find(&saved, A).content_hash, "ha");
    assert!(find(&saved, B).last_checked_at.is_none());
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_check_now_does_not_double_notify() {
    let registry = Arc::new(MemoryRegistry::new(vec![target(A, "old")]));
    let fetcher = StubFingerprinter::new(Duration::from_millis(100));
    fetcher.hash(A, "new");
    let transport = RecordingTransport::new();
    let (engine, _) = engine(&test_config(), registry.clone(), fetcher, transport.clone());

    let (first, second) = tokio::join!(engine.run_once(), engine.run_once());

    assert_eq!(first.unwrap().notified + second.unwrap().notified, 1);
    assert_eq!(transport.sent().len(), 1);
    assert_eq!(registry.load().await[0].content_hash, "new");
}

#[tokio::test]
async fn test_empty_registry_is_a_quiet_round() {
    let registry = Arc::new(MemoryRegistry::default());
    let (engine, _) = engine(
        &test_config(),
        registry.clone(),
        StubFingerprinter::new(Duration::ZERO),
        RecordingTransport::new(),
    );

    let summary = engine.run_once().await.unwrap();

    assert_eq!(summary.total(), 0);
    assert_eq!(registry.save_count(), 0);
    assert!(engine.health().last_round_at.is_some());
}
