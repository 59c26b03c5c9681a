//! Dashboard aggregates: slow feed of project-wide statistics.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::core::{FeedError, FeedRegistry};
use crate::monitors::{
    number_field, Alert, AlertKind, AlertSeverity, AlertSink, Classifier, DomainMonitor,
    MonitorConfig, MonitorHandle,
};

/// Feed key of the dashboard endpoint.
pub const FEED_KEY: &str = "dashboard";

/// 15 s interval, 2 retries, default multiplier.
pub fn config() -> MonitorConfig {
    MonitorConfig::new("dashboard", FEED_KEY, Duration::from_millis(15_000)).max_retries(2)
}

/// When the aggregates deserve an alert.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DashboardThresholds {
    /// `alertCount` at or above this raises an [`AlertKind::AlertBacklog`].
    pub max_alert_count: f64,
    /// `productivityDelta` at or below this raises an [`AlertKind::ProductivityDrop`].
    pub min_productivity_delta: f64,
}

impl Default for DashboardThresholds {
    fn default() -> Self {
        Self {
            max_alert_count: 5.0,
            min_productivity_delta: -10.0,
        }
    }
}

/// Compares the aggregates (at the root or under `data`) with thresholds.
#[derive(Debug, Clone, Default)]
pub struct DashboardClassifier {
    thresholds: DashboardThresholds,
}

impl DashboardClassifier {
    /// A classifier with custom thresholds.
    pub fn new(thresholds: DashboardThresholds) -> Self {
        Self { thresholds }
    }
}

impl Classifier for DashboardClassifier {
    fn classify(&mut self, payload: &Value, _now: DateTime<Utc>) -> Vec<Alert> {
        let stats = payload.get("data").filter(|d| d.is_object()).unwrap_or(payload);
        let mut alerts = Vec::new();

        if let Some(count) = number_field(stats, "alertCount") {
            if count >= self.thresholds.max_alert_count {
                alerts.push(
                    Alert::new(
                        AlertKind::AlertBacklog,
                        AlertSeverity::Warning,
                        format!("{count} open alerts on the dashboard"),
                    )
                    .with_details(json!({ "alertCount": count })),
                );
            }
        }
        if let Some(delta) = number_field(stats, "productivityDelta") {
            if delta <= self.thresholds.min_productivity_delta {
                alerts.push(
                    Alert::new(
                        AlertKind::ProductivityDrop,
                        AlertSeverity::Warning,
                        format!("Productivity changed by {delta}%"),
                    )
                    .with_details(json!({ "productivityDelta": delta })),
                );
            }
        }
        alerts
    }
}

/// The dashboard monitor with default thresholds, not yet started.
pub fn monitor(sink: Arc<dyn AlertSink>) -> DomainMonitor {
    monitor_with(DashboardThresholds::default(), sink)
}

/// The dashboard monitor with custom thresholds, not yet started.
pub fn monitor_with(thresholds: DashboardThresholds, sink: Arc<dyn AlertSink>) -> DomainMonitor {
    DomainMonitor::new(config(), DashboardClassifier::new(thresholds), sink)
}

/// Starts the dashboard monitor on `registry`.
pub fn start(registry: &FeedRegistry, sink: Arc<dyn AlertSink>) -> Result<MonitorHandle, FeedError> {
    monitor(sink).start(registry)
}
