use std::sync::{Arc, Mutex};
use std::time::Duration;

use lib_feeds::core::{FeedError, FeedFrame, FeedKey, LoopState, SubscribeOptions};
use project_tests::{advance_ms, fail, ok, registry, ScriptedFetcher, UpdateLog};
use serde_json::json;

#[tokio::test(start_paused = true)]
async fn subscribers_of_one_key_share_a_single_loop() {
    let fetcher = ScriptedFetcher::new(vec![ok(json!({"v": 1})), ok(json!({"v": 2}))]);
    let (registry, _) = registry(&fetcher);
    let first = UpdateLog::new();
    let second = UpdateLog::new();

    registry.subscribe("equipment", first.options(Duration::from_secs(1))).unwrap();
    advance_ms(10).await;
    registry.subscribe("equipment", second.options(Duration::from_secs(1))).unwrap();

    // A late subscriber only sees results fetched after it joined.
    advance_ms(100).await;
    assert!(second.payloads().is_empty());
    assert_eq!(registry.feed_count(), 1);
    assert_eq!(fetcher.calls(), 1);

    advance_ms(1_000).await;
    assert_eq!(fetcher.calls(), 2);
    assert_eq!(first.payloads(), vec![json!({"v": 1}), json!({"v": 2})]);
    assert_eq!(second.payloads(), vec![json!({"v": 2})]);

    let snapshot = registry.snapshot(&FeedKey::from("equipment")).unwrap();
    assert_eq!(snapshot.subscriber_count, 2);
}

#[tokio::test(start_paused = true)]
async fn fastest_subscriber_sets_the_pace() {
    let fetcher = ScriptedFetcher::new(vec![ok(json!([]))]);
    let (registry, _) = registry(&fetcher);
    let key = FeedKey::from("dashboard");

    registry.subscribe(key.clone(), UpdateLog::new().options(Duration::from_secs(10))).unwrap();
    advance_ms(10).await;
    let fast = registry
        .subscribe(key.clone(), UpdateLog::new().options(Duration::from_secs(1)))
        .unwrap();

    // The pending wait is re-evaluated against the new minimum.
    advance_ms(1_500).await;
    assert_eq!(fetcher.calls(), 2);
    assert_eq!(
        registry.snapshot(&key).unwrap().effective_interval,
        Some(Duration::from_secs(1))
    );

    // Back to 10 s once the fast subscriber leaves; last fetch completed at 1 s.
    assert!(registry.unsubscribe(&fast));
    advance_ms(8_000).await;
    assert_eq!(fetcher.calls(), 2);
    advance_ms(2_000).await;
    assert_eq!(fetcher.calls(), 3);
}

#[tokio::test(start_paused = true)]
async fn last_unsubscribe_tears_the_feed_down() {
    let fetcher = ScriptedFetcher::new(vec![ok(json!({"v": 1}))]);
    let (registry, _) = registry(&fetcher);
    let log = UpdateLog::new();
    let key = FeedKey::from("quality-checks");

    let a = registry.subscribe(key.clone(), log.options(Duration::from_secs(1))).unwrap();
    let b = registry.subscribe(key.clone(), log.options(Duration::from_secs(1))).unwrap();
    advance_ms(10).await;

    assert!(registry.unsubscribe(&a));
    assert!(registry.contains(&key));
    assert!(registry.unsubscribe(&b));
    assert!(!registry.contains(&key));
    assert_eq!(registry.feed_count(), 0);

    // Double unsubscribe is a harmless no-op.
    assert!(!registry.unsubscribe(&b));

    let calls = fetcher.calls();
    advance_ms(10_000).await;
    assert_eq!(fetcher.calls(), calls);
}

#[tokio::test(start_paused = true)]
async fn resubscribing_starts_from_scratch() {
    let fetcher = ScriptedFetcher::new(vec![ok(json!({"v": 1}))]);
    let (registry, _) = registry(&fetcher);
    let first = UpdateLog::new();
    let again = UpdateLog::new();

    let handle = registry.subscribe("equipment", first.options(Duration::from_secs(1))).unwrap();
    advance_ms(10).await;
    registry.unsubscribe(&handle);

    // No archived payload: the same data is delivered again to the new loop.
    registry.subscribe("equipment", again.options(Duration::from_secs(1))).unwrap();
    advance_ms(10).await;
    assert_eq!(first.payloads(), vec![json!({"v": 1})]);
    assert_eq!(again.payloads(), vec![json!({"v": 1})]);
    assert_eq!(fetcher.calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn result_arriving_after_teardown_is_discarded() {
    let fetcher = ScriptedFetcher::new(vec![ok(json!({"late": true}))]).with_latency(Duration::from_secs(1));
    let (registry, _) = registry(&fetcher);
    let log = UpdateLog::new();

    let handle = registry.subscribe("ai-analysis", log.options(Duration::from_secs(1))).unwrap();
    advance_ms(100).await;
    registry.unsubscribe(&handle);
    advance_ms(5_000).await;

    assert_eq!(fetcher.calls(), 1);
    assert!(log.payloads().is_empty());
}

#[tokio::test(start_paused = true)]
async fn handles_of_a_failed_feed_become_inert() {
    let fetcher = ScriptedFetcher::new(vec![fail("gone")]);
    let (registry, _) = registry(&fetcher);
    let log = UpdateLog::new();
    let key = FeedKey::from("dashboard");

    let handle = registry
        .subscribe(key.clone(), log.options(Duration::from_secs(1)).max_retries(0))
        .unwrap();
    advance_ms(100).await;
    assert!(!registry.contains(&key));
    assert!(!registry.unsubscribe(&handle));

    // A later subscription gets a fresh loop with an eager fetch.
    registry.subscribe(key.clone(), log.options(Duration::from_secs(1))).unwrap();
    advance_ms(10).await;
    assert_eq!(fetcher.calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn subscribing_from_the_terminal_error_callback_gets_a_fresh_loop() {
    let fetcher = ScriptedFetcher::new(vec![fail("gone"), ok(json!({"back": true}))]);
    let (registry, _) = registry(&fetcher);
    let registry = Arc::new(registry);
    let key = FeedKey::from("equipment");
    let terminal = Arc::new(Mutex::new(false));

    let options = {
        let registry = Arc::downgrade(&registry);
        let terminal = Arc::clone(&terminal);
        SubscribeOptions::new(Duration::from_secs(1))
            .max_retries(0)
            .on_error(move |error: &FeedError| {
                if error.is_terminal() {
                    *terminal.lock().unwrap() = true;
                    if let Some(registry) = registry.upgrade() {
                        let _ = registry.subscribe("equipment", SubscribeOptions::new(Duration::from_secs(1)));
                    }
                }
            })
    };
    registry.subscribe(key.clone(), options).unwrap();
    advance_ms(100).await;

    assert!(*terminal.lock().unwrap());
    assert!(registry.contains(&key));
    let snapshot = registry.snapshot(&key).unwrap();
    assert_eq!(snapshot.last_payload.as_deref(), Some(&json!({"back": true})));
}

#[tokio::test(start_paused = true)]
async fn distinct_keys_are_independent() {
    let fetcher = ScriptedFetcher::new(vec![ok(json!(0))])
        .for_key("a", vec![ok(json!("a"))])
        .for_key(["quality-checks", "site-7"], vec![fail("nope")]);
    let (registry, _) = registry(&fetcher);
    let a = UpdateLog::new();
    let b = UpdateLog::new();

    registry.subscribe("a", a.options(Duration::from_secs(1))).unwrap();
    registry
        .subscribe(["quality-checks", "site-7"], b.options(Duration::from_secs(1)).max_retries(0))
        .unwrap();
    advance_ms(3_100).await;

    assert_eq!(a.payloads(), vec![json!("a")]);
    assert_eq!(fetcher.calls_for("a"), 4);
    assert_eq!(fetcher.calls_for(["quality-checks", "site-7"]), 1);
    assert_eq!(b.errors().len(), 1);
    assert_eq!(registry.feed_count(), 1);
}

#[tokio::test]
async fn invalid_subscriptions_are_rejected() {
    let fetcher = ScriptedFetcher::new(vec![ok(json!(null))]);
    let (registry, _) = registry(&fetcher);

    let blank = registry.subscribe("  ", SubscribeOptions::new(Duration::from_secs(1)));
    assert!(matches!(blank, Err(FeedError::InvalidKey(_))));

    let zero = registry.subscribe("equipment", SubscribeOptions::new(Duration::ZERO));
    assert!(matches!(zero, Err(FeedError::InvalidInterval(_))));

    let flat = registry.subscribe(
        "equipment",
        SubscribeOptions::new(Duration::from_secs(1)).backoff_multiplier(1.0),
    );
    assert!(matches!(flat, Err(FeedError::InvalidOptions { .. })));

    assert_eq!(registry.feed_count(), 0);
    assert_eq!(fetcher.calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn shutdown_stops_every_feed() {
    let fetcher = ScriptedFetcher::new(vec![ok(json!(1))]);
    let (registry, _) = registry(&fetcher);
    let updates = Arc::new(Mutex::new(0));

    for key in ["equipment", "dashboard"] {
        let updates = Arc::clone(&updates);
        registry
            .subscribe(
                key,
                SubscribeOptions::new(Duration::from_secs(1)).on_update(move |_: &FeedFrame| {
                    *updates.lock().unwrap() += 1;
                }),
            )
            .unwrap();
    }
    advance_ms(10).await;
    registry.shutdown();
    assert_eq!(registry.feed_count(), 0);

    let calls = fetcher.calls();
    advance_ms(5_000).await;
    assert_eq!(fetcher.calls(), calls);
    assert_eq!(*updates.lock().unwrap(), 2);
}

#[tokio::test(start_paused = true)]
async fn panicking_subscriber_does_not_kill_the_feed() {
    let fetcher = ScriptedFetcher::new(vec![ok(json!({"v": 1})), ok(json!({"v": 2})), ok(json!({"v": 3}))]);
    let (registry, _) = registry(&fetcher);
    let key = FeedKey::from("equipment");

    let faulty = SubscribeOptions::new(Duration::from_secs(1))
        .on_update(|_: &FeedFrame| panic!("subscriber bug"));
    registry.subscribe(key.clone(), faulty).unwrap();
    advance_ms(10).await;

    let healthy = UpdateLog::new();
    registry.subscribe(key.clone(), healthy.options(Duration::from_secs(1))).unwrap();
    advance_ms(2_000).await;

    let snapshot = registry.snapshot(&key).unwrap();
    assert_eq!(snapshot.state, LoopState::Scheduled);
    assert_eq!(snapshot.fetch_count, 3);
    assert_eq!(healthy.payloads(), vec![json!({"v": 2}), json!({"v": 3})]);
}
