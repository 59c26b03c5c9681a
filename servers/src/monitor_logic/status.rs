use lib_feeds::core::{FeedKey, FeedRegistry, FeedSnapshot};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::interval;

pub fn describe(snapshot: &FeedSnapshot) -> String {
    format!(
        "feed '{}': {:?}, {} subscriber(s), {} fetches, {} deliveries, {} consecutive failure(s)",
        snapshot.key,
        snapshot.state,
        snapshot.subscriber_count,
        snapshot.fetch_count,
        snapshot.delivery_count,
        snapshot.retry_count
    )
}

/// Periodically logs the state of each watched feed.
pub async fn run(
    registry: Arc<FeedRegistry>,
    keys: Vec<FeedKey>,
    every: Duration,
    mut shutdown: broadcast::Receiver<()>,
) {
    let mut check_interval = interval(every);
    // The first tick completes immediately.
    check_interval.tick().await;

    loop {
        tokio::select! {
            _ = shutdown.recv() => {
                log::info!("Status service received shutdown signal.");
                break;
            }
            _ = check_interval.tick() => {
                for key in &keys {
                    match registry.snapshot(key) {
                        Some(snapshot) => log::info!("{}", describe(&snapshot)),
                        None => log::warn!("feed '{}' is not running.", key),
                    }
                }
            }
        }
    }
}
