use std::time::Duration;

use lib_feeds::configs::FeedSettings;
use lib_feeds::core::{FeedError, FeedKey, FetchError, LoopState, Visibility};
use project_tests::{advance_ms, fail, ok, registry, registry_with, ScriptedFetcher, UpdateLog};
use serde_json::json;

#[tokio::test(start_paused = true)]
async fn first_subscriber_triggers_an_eager_fetch_then_polls_at_interval() {
    let fetcher = ScriptedFetcher::new(vec![ok(json!({"v": 1})), ok(json!({"v": 1})), ok(json!({"v": 2}))]);
    let (registry, _) = registry(&fetcher);
    let log = UpdateLog::new();

    registry.subscribe("equipment", log.options(Duration::from_secs(1))).unwrap();

    advance_ms(10).await;
    assert_eq!(fetcher.calls(), 1);
    assert_eq!(log.payloads(), vec![json!({"v": 1})]);

    // Same payload again: fetched but not delivered.
    advance_ms(1_000).await;
    assert_eq!(fetcher.calls(), 2);
    assert_eq!(log.payloads().len(), 1);

    advance_ms(1_000).await;
    assert_eq!(fetcher.calls(), 3);
    assert_eq!(log.payloads(), vec![json!({"v": 1}), json!({"v": 2})]);

    let frames = log.frames();
    assert_eq!(frames[0].sequence, 1);
    assert_eq!(frames[1].sequence, 2);
    assert_eq!(frames[1].key, FeedKey::from("equipment"));
}

#[tokio::test(start_paused = true)]
async fn never_more_than_one_fetch_in_flight() {
    let fetcher = ScriptedFetcher::new(vec![ok(json!([]))]).with_latency(Duration::from_secs(3));
    let (registry, _) = registry(&fetcher);
    let log = UpdateLog::new();

    // Fetches take longer than the interval.
    registry.subscribe("slow", log.options(Duration::from_secs(1))).unwrap();
    advance_ms(10_000).await;

    assert_eq!(fetcher.max_in_flight(), 1);
    // Fetches at 0, 4 and 8 s: the interval counts from completion.
    assert_eq!(fetcher.calls(), 3);
}

#[tokio::test(start_paused = true)]
async fn interval_churn_during_a_fetch_never_overlaps_fetches() {
    let fetcher = ScriptedFetcher::new(vec![ok(json!([]))]).with_latency(Duration::from_millis(700));
    let (registry, _) = registry(&fetcher);

    registry.subscribe("slow", UpdateLog::new().options(Duration::from_secs(5))).unwrap();
    advance_ms(10).await;

    // Faster subscribers come and go while the first fetch is running.
    for _ in 0..50 {
        let fast = registry
            .subscribe("slow", UpdateLog::new().options(Duration::from_millis(200)))
            .unwrap();
        advance_ms(5).await;
        assert!(registry.unsubscribe(&fast));
    }
    registry.subscribe("slow", UpdateLog::new().options(Duration::from_millis(200))).unwrap();
    advance_ms(2_740).await;

    assert_eq!(fetcher.max_in_flight(), 1);
    // Fetches at 0, 0.9, 1.8 and 2.7 s: 700 ms each plus the 200 ms interval.
    assert_eq!(fetcher.calls(), 4);
}

#[tokio::test(start_paused = true)]
async fn retries_back_off_then_the_loop_is_disposed() {
    let fetcher = ScriptedFetcher::new(vec![fail("connection refused")]);
    let (registry, _) = registry(&fetcher);
    let log = UpdateLog::new();

    registry
        .subscribe("quality-checks", log.options(Duration::from_secs(1)).max_retries(2))
        .unwrap();

    // Failures at 0 s, 1 s (base delay) and 3 s (doubled); the third exceeds the budget.
    advance_ms(10).await;
    assert_eq!(fetcher.calls(), 1);
    assert_eq!(
        registry.snapshot(&FeedKey::from("quality-checks")).unwrap().retry_count,
        1
    );
    advance_ms(60_000).await;
    assert_eq!(fetcher.calls(), 3);

    let errors = log.errors();
    assert_eq!(errors.len(), 3);
    assert!(matches!(
        &errors[0],
        FeedError::Fetch { attempt: 1, retry_in, .. } if *retry_in == Duration::from_secs(1)
    ));
    assert!(matches!(
        &errors[1],
        FeedError::Fetch { attempt: 2, retry_in, .. } if *retry_in == Duration::from_secs(2)
    ));
    assert!(matches!(&errors[2], FeedError::RetriesExceeded { attempts: 3, .. }));
    assert_eq!(errors.iter().filter(|e| e.is_terminal()).count(), 1);
    assert!(log.payloads().is_empty());
    assert!(!registry.contains(&FeedKey::from("quality-checks")));
}

#[tokio::test(start_paused = true)]
async fn retry_delays_never_exceed_the_cap() {
    let fetcher = ScriptedFetcher::new(vec![fail("down")]);
    let settings = FeedSettings {
        max_delay_cap_ms: 5_000,
        ..FeedSettings::default()
    };
    let (registry, _) = registry_with(&fetcher, settings, Visibility::Visible);
    let log = UpdateLog::new();

    registry
        .subscribe(
            "dashboard",
            log.options(Duration::from_secs(4)).max_retries(10).backoff_multiplier(3.0),
        )
        .unwrap();
    advance_ms(30_000).await;

    let delays: Vec<Duration> = log
        .errors()
        .iter()
        .filter_map(|e| match e {
            FeedError::Fetch { retry_in, .. } => Some(*retry_in),
            _ => None,
        })
        .collect();
    assert_eq!(delays[0], Duration::from_secs(4));
    assert!(delays[1..].iter().all(|d| *d == Duration::from_secs(5)));
}

#[tokio::test(start_paused = true)]
async fn success_resets_the_failure_count() {
    let fetcher = ScriptedFetcher::new(vec![fail("blip"), fail("blip"), ok(json!({"ok": true}))]);
    let (registry, _) = registry(&fetcher);
    let log = UpdateLog::new();
    let key = FeedKey::from("ai-analysis");

    registry
        .subscribe(key.clone(), log.options(Duration::from_secs(1)).max_retries(2))
        .unwrap();
    advance_ms(3_500).await;

    let snapshot = registry.snapshot(&key).unwrap();
    assert_eq!(snapshot.retry_count, 0);
    assert_eq!(snapshot.delivery_count, 1);
    assert_eq!(log.payloads(), vec![json!({"ok": true})]);
    assert!(log.errors().iter().all(|e| !e.is_terminal()));
}

#[tokio::test(start_paused = true)]
async fn slow_fetches_time_out() {
    let fetcher = ScriptedFetcher::new(vec![ok(json!(1))]).with_latency(Duration::from_secs(2));
    let settings = FeedSettings {
        fetch_timeout_ms: Some(500),
        ..FeedSettings::default()
    };
    let (registry, _) = registry_with(&fetcher, settings, Visibility::Visible);
    let log = UpdateLog::new();

    registry
        .subscribe("equipment", log.options(Duration::from_secs(1)).max_retries(0))
        .unwrap();
    advance_ms(5_000).await;

    let errors = log.errors();
    assert_eq!(errors.len(), 1);
    assert!(matches!(
        &errors[0],
        FeedError::RetriesExceeded { last: FetchError::Timeout(limit), .. } if *limit == Duration::from_millis(500)
    ));
    assert!(log.payloads().is_empty());
}

#[tokio::test(start_paused = true)]
async fn snapshot_reports_the_schedule() {
    let fetcher = ScriptedFetcher::new(vec![ok(json!({"n": 1}))]);
    let (registry, _) = registry(&fetcher);
    let key = FeedKey::from("equipment");

    registry.subscribe(key.clone(), UpdateLog::new().options(Duration::from_secs(3))).unwrap();
    advance_ms(100).await;

    let snapshot = registry.snapshot(&key).unwrap();
    assert_eq!(snapshot.state, LoopState::Scheduled);
    assert_eq!(snapshot.subscriber_count, 1);
    assert_eq!(snapshot.effective_interval, Some(Duration::from_secs(3)));
    assert_eq!(snapshot.fetch_count, 1);
    assert_eq!(snapshot.last_payload.as_deref(), Some(&json!({"n": 1})));
    assert!(snapshot.last_fetched_at.is_some());
}
