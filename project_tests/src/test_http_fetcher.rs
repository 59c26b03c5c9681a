//! # `HttpFeedFetcher` Live Check
//!
//! Runs the HTTP fetcher against `httpbin.org`, a public, well-behaved
//! endpoint, first directly and then through a feed registry.
//!
//! These checks need network access and are executed with `tokio::main`
//! rather than as part of `cargo test`.

#![forbid(unsafe_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use clap::Parser;
use lib_feeds::configs::FeedSettings;
use lib_feeds::core::{FeedError, FeedFetcher, FeedFrame, FeedKey, FeedRegistry, FetchError, SubscribeOptions};
use lib_feeds::retrieve::{ApiClient, HttpFeedFetcher};

#[derive(Parser, Debug)]
#[clap(about = "Live check of the HTTP feed fetcher", version)]
struct Args {
    #[clap(long, default_value = "https://httpbin.org/", help = "Base URL to poll.")]
    base_url: String,

    #[clap(long, default_value_t = 5, help = "Seconds to keep the polling feed running.")]
    seconds: u64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let client = ApiClient::new(&args.base_url, Some("test_secret_123".into()), Some(Duration::from_secs(10)))?;
    let fetcher = HttpFeedFetcher::new(client).route("missing", "status/404");

    println!("--- Starting HTTP Fetcher Checks ---");

    // --- CHECK 1: Plain JSON document ---
    println!("\n[Check 1] Fetching a JSON document...");
    let payload = fetcher.fetch(&FeedKey::from("json")).await?;
    assert!(payload.is_object());
    println!("✅ Received keys: {:?}", payload.as_object().map(|o| o.keys().collect::<Vec<_>>()));

    // --- CHECK 2: Routed key and status mapping ---
    println!("\n[Check 2] Fetching a routed key that answers 404...");
    match fetcher.fetch(&FeedKey::from("missing")).await {
        Err(FetchError::Status { status, .. }) => {
            assert_eq!(status, 404);
            println!("✅ Mapped to status error {}", status);
        }
        other => anyhow::bail!("expected a status error, got {:?}", other),
    }

    // --- CHECK 3: Non-JSON body ---
    println!("\n[Check 3] Fetching an HTML page...");
    match fetcher.fetch(&FeedKey::from("html")).await {
        Err(FetchError::Malformed(reason)) => println!("✅ Mapped to malformed payload: {}", reason),
        other => anyhow::bail!("expected a malformed payload, got {:?}", other),
    }

    // --- CHECK 4: Polling through the registry ---
    println!("\n[Check 4] Polling 'uuid' every second for {} s...", args.seconds);
    let registry = FeedRegistry::with_global_visibility(Arc::new(fetcher), FeedSettings::default());
    let deliveries = Arc::new(AtomicUsize::new(0));
    let options = {
        let deliveries = Arc::clone(&deliveries);
        SubscribeOptions::new(Duration::from_secs(1))
            .on_update(move |frame: &FeedFrame| {
                deliveries.fetch_add(1, Ordering::SeqCst);
                println!("   update #{}: {}", frame.sequence, frame.payload);
            })
            .on_error(|error: &FeedError| println!("   error: {}", error))
    };
    let handle = registry.subscribe("uuid", options)?;
    tokio::time::sleep(Duration::from_secs(args.seconds)).await;
    registry.unsubscribe(&handle);

    // Every uuid differs, so every successful fetch is a delivery.
    let delivered = deliveries.load(Ordering::SeqCst);
    assert!(delivered >= 1);
    println!("✅ {} deliveries", delivered);

    println!("\n--- All HTTP Fetcher Checks Passed ---");
    Ok(())
}
