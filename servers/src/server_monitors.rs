use anyhow::{Context, Result};
use lib_feeds::core::{FeedKey, FeedRegistry};
use lib_feeds::loggers;
use lib_feeds::monitors::{ai_analysis, dashboard, equipment, quality, AlertSink, LogAlertSink};
use lib_feeds::retrieve::{ApiClient, HttpFeedFetcher};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;

mod monitor_logic;
use monitor_logic::{config, signals, status};

#[tokio::main]
async fn main() -> Result<()> {
    let config = config::load_config();
    let log_dir = config.log_dir.clone().unwrap_or_else(|| PathBuf::from("./logs"));
    let log_path = loggers::setup_logging(
        "server_monitors",
        &log_dir,
        config.log_level.as_deref().unwrap_or("info"),
    )?;
    log::info!("Logging to {}", log_path.display());

    let settings = config.feed_settings()?;
    let base_url = config
        .api_base_url
        .as_deref()
        .context("No API base URL configured")?;
    let client = ApiClient::new(base_url, config.api_token.clone(), settings.fetch_timeout())?;
    let fetcher = config
        .routes()
        .into_iter()
        .fold(HttpFeedFetcher::new(client), |fetcher, (key, path)| fetcher.route(key, path));
    log::info!("Polling API at {}", base_url);

    let registry = Arc::new(FeedRegistry::with_global_visibility(Arc::new(fetcher), settings));
    let sink: Arc<dyn AlertSink> = Arc::new(LogAlertSink);
    let monitors = vec![
        equipment::start(&registry, Arc::clone(&sink))?,
        ai_analysis::start(&registry, Arc::clone(&sink))?,
        quality::start(&registry, Arc::clone(&sink))?,
        dashboard::start(&registry, Arc::clone(&sink))?,
    ];

    let (shutdown_tx, _) = tokio::sync::broadcast::channel(1);

    let signals_handle = tokio::spawn(signals::run(
        Arc::clone(registry.visibility()),
        shutdown_tx.subscribe(),
    ));

    let keys: Vec<FeedKey> = monitors.iter().map(|m| m.subscription().key().clone()).collect();
    let status_handle = tokio::spawn(status::run(
        Arc::clone(&registry),
        keys,
        Duration::from_secs(config.status_interval_seconds.unwrap_or(60).max(1)),
        shutdown_tx.subscribe(),
    ));

    // Wait for shutdown signal
    tokio::select! {
        _ = signal::ctrl_c() => {
            log::info!("Ctrl-C received, initiating shutdown.");
        }
        _ = async {
            #[cfg(unix)]
            {
                match signal::unix::signal(signal::unix::SignalKind::terminate()) {
                    Ok(mut term_signal) => {
                        term_signal.recv().await;
                        log::info!("SIGTERM received, initiating shutdown.");
                    }
                    Err(e) => {
                        log::warn!("Cannot listen for SIGTERM: {}", e);
                        std::future::pending::<()>().await;
                    }
                }
            }
            #[cfg(not(unix))]
            {
                // On non-unix platforms, just wait forever.
                std::future::pending::<()>().await;
            }
        } => {}
    }

    // Send shutdown signal to all components
    let _ = shutdown_tx.send(());

    for monitor in &monitors {
        monitor.stop(&registry);
    }
    registry.shutdown();

    let (signals_result, _) = tokio::join!(signals_handle, status_handle);
    if let Ok(Err(e)) = signals_result {
        log::warn!("Signal service failed: {}", e);
    }

    log::info!("Shutdown complete.");
    Ok(())
}
