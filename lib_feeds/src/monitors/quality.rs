//! Quality checks: reports checks that failed within the last hour.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::core::{FeedError, FeedRegistry};
use crate::monitors::{
    entries, entry_id, label, str_field, Alert, AlertKind, AlertSeverity, AlertSink, Classifier,
    DomainMonitor, MonitorConfig, MonitorHandle,
};

/// Feed key of the quality-check endpoint.
pub const FEED_KEY: &str = "quality-checks";

/// How far back a failure still counts as recent.
pub fn recent_window() -> chrono::Duration {
    chrono::Duration::minutes(60)
}

/// 8 s interval, 2 retries, 1.5 multiplier.
pub fn config() -> MonitorConfig {
    MonitorConfig::new("quality", FEED_KEY, Duration::from_millis(8_000))
        .max_retries(2)
        .backoff_multiplier(1.5)
}

fn created_at(entry: &Value) -> Option<DateTime<Utc>> {
    let raw = str_field(entry, "createdAt")?;
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .ok()
}

/// Failed checks created within [`recent_window`] of `now`. Checks without a
/// parseable `createdAt` are ignored.
pub fn recent_failures(payload: &Value, now: DateTime<Utc>) -> Vec<&Value> {
    let since = now - recent_window();
    entries(payload)
        .into_iter()
        .filter(|entry| str_field(entry, "status") == Some("failed"))
        .filter(|entry| created_at(entry).is_some_and(|t| t >= since))
        .collect()
}

/// Stateless: one warning per recent failure in each delivered payload.
#[derive(Debug, Clone, Default)]
pub struct QualityClassifier;

impl Classifier for QualityClassifier {
    fn classify(&mut self, payload: &Value, now: DateTime<Utc>) -> Vec<Alert> {
        recent_failures(payload, now)
            .into_iter()
            .map(|entry| {
                Alert::new(
                    AlertKind::QualityCheckFailed,
                    AlertSeverity::Warning,
                    format!("Quality check {} failed", label(entry)),
                )
                .with_subject(entry_id(entry))
            })
            .collect()
    }
}

/// The quality monitor, not yet started.
pub fn monitor(sink: Arc<dyn AlertSink>) -> DomainMonitor {
    DomainMonitor::new(config(), QualityClassifier, sink)
}

/// Starts the quality monitor on `registry`.
pub fn start(registry: &FeedRegistry, sink: Arc<dyn AlertSink>) -> Result<MonitorHandle, FeedError> {
    monitor(sink).start(registry)
}
