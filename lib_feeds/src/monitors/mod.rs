//! # Domain Monitors
//!
//! A domain monitor is one feed subscription with a fixed policy (key,
//! interval, retry budget, backoff multiplier) plus a [`Classifier`] that turns
//! each changed payload into [`Alert`]s for an [`AlertSink`]. Because the poll
//! loop only delivers changed payloads, a classifier never re-raises alerts for
//! data it has already seen.
//!
//! All four monitors are the same [`DomainMonitor`] engine with different
//! configuration:
//!
//! | monitor       | feed key         | interval | retries | multiplier |
//! |---------------|------------------|----------|---------|------------|
//! | `equipment`   | `equipment`      | 3 s      | 5       | 1.2        |
//! | `ai_analysis` | `ai-analysis`    | 2 s      | 3       | 2.0        |
//! | `quality`     | `quality-checks` | 8 s      | 2       | 1.5        |
//! | `dashboard`   | `dashboard`      | 15 s     | 2       | 2.0        |
//!
//! Monitors share nothing but the registry's visibility controller.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

use crate::core::{FeedError, FeedFrame, FeedKey, FeedRegistry, SubscribeOptions, SubscriptionHandle};

/// AI-plan-analysis progress monitor.
pub mod ai_analysis;
/// Dashboard aggregate monitor.
pub mod dashboard;
/// Equipment telemetry monitor.
pub mod equipment;
/// Quality-check results monitor.
pub mod quality;

/// How urgent an alert is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertSeverity {
    /// Noteworthy, no action needed.
    Info,
    /// Needs attention.
    Warning,
    /// Needs immediate attention.
    Critical,
}

/// What an alert is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum AlertKind {
    /// A piece of equipment reports `offline`.
    EquipmentOffline,
    /// A piece of equipment is below the battery threshold.
    LowBattery,
    /// An AI plan analysis just finished.
    AnalysisCompleted,
    /// A quality check failed recently.
    QualityCheckFailed,
    /// The dashboard reports too many open alerts.
    AlertBacklog,
    /// The dashboard reports a productivity drop.
    ProductivityDrop,
    /// The monitor's feed exhausted its retries and stopped.
    FeedUnavailable,
}

/// # Alert
///
/// A higher-level observation raised by a monitor.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Alert {
    /// Name of the monitor that raised the alert.
    pub monitor: String,
    /// Category.
    pub kind: AlertKind,
    /// Urgency.
    pub severity: AlertSeverity,
    /// Identifier of the entry the alert is about, when there is one.
    pub subject: Option<String>,
    /// Human-readable description.
    pub message: String,
    /// Extra structured data (e.g. the AI confidence).
    pub details: Value,
}

impl Alert {
    /// An alert without subject or details; the monitor name is stamped on raise.
    pub fn new(kind: AlertKind, severity: AlertSeverity, message: impl Into<String>) -> Self {
        Self {
            monitor: String::new(),
            kind,
            severity,
            subject: None,
            message: message.into(),
            details: Value::Null,
        }
    }

    /// Sets the subject identifier.
    pub fn with_subject(mut self, subject: Option<String>) -> Self {
        self.subject = subject;
        self
    }

    /// Sets structured details.
    pub fn with_details(mut self, details: Value) -> Self {
        self.details = details;
        self
    }
}

/// Destination of alerts (a log, a toast queue, a notification service...).
pub trait AlertSink: Send + Sync {
    /// Handles one alert.
    fn raise(&self, alert: &Alert);
}

impl<F> AlertSink for F
where
    F: Fn(&Alert) + Send + Sync,
{
    fn raise(&self, alert: &Alert) {
        (self)(alert)
    }
}

/// Writes alerts to the `log` facade under the `alerts` target.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogAlertSink;

impl AlertSink for LogAlertSink {
    fn raise(&self, alert: &Alert) {
        let level = match alert.severity {
            AlertSeverity::Info => log::Level::Info,
            AlertSeverity::Warning => log::Level::Warn,
            AlertSeverity::Critical => log::Level::Error,
        };
        log::log!(
            target: "alerts",
            level,
            "[{}] {:?}: {}",
            alert.monitor,
            alert.kind,
            alert.message
        );
    }
}

/// Turns a changed payload into alerts. Classifiers may keep state between
/// calls (e.g. to detect transitions); each monitor owns its own instance.
pub trait Classifier: Send + 'static {
    /// Alerts for `payload`, evaluated at wall-clock time `now`.
    fn classify(&mut self, payload: &Value, now: DateTime<Utc>) -> Vec<Alert>;
}

/// # Monitor Configuration
#[derive(Debug, Clone, PartialEq)]
pub struct MonitorConfig {
    /// Monitor name, stamped on every alert.
    pub name: String,
    /// Feed the monitor subscribes to.
    pub feed_key: FeedKey,
    /// Polling interval.
    pub interval: Duration,
    /// Consecutive failures tolerated before the feed is disposed.
    pub max_retries: u32,
    /// Growth factor of the retry delay.
    pub backoff_multiplier: f64,
}

impl MonitorConfig {
    /// Configuration for `name` polling `feed_key` every `interval`.
    pub fn new(name: impl Into<String>, feed_key: impl Into<FeedKey>, interval: Duration) -> Self {
        Self {
            name: name.into(),
            feed_key: feed_key.into(),
            interval,
            max_retries: crate::core::DEFAULT_MAX_RETRIES,
            backoff_multiplier: crate::core::DEFAULT_BACKOFF_MULTIPLIER,
        }
    }

    /// Sets the retry budget.
    pub fn max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Sets the backoff multiplier.
    pub fn backoff_multiplier(mut self, multiplier: f64) -> Self {
        self.backoff_multiplier = multiplier;
        self
    }
}

/// # Domain Monitor
///
/// Builder for a monitor subscription. Nothing polls until [`DomainMonitor::start`].
pub struct DomainMonitor {
    config: MonitorConfig,
    classifier: Box<dyn Classifier>,
    sink: Arc<dyn AlertSink>,
    forward: Option<Arc<dyn Fn(&FeedFrame) + Send + Sync>>,
}

impl DomainMonitor {
    /// A monitor with the given policy, classifier and alert sink.
    pub fn new(config: MonitorConfig, classifier: impl Classifier, sink: Arc<dyn AlertSink>) -> Self {
        Self {
            config,
            classifier: Box::new(classifier),
            sink,
            forward: None,
        }
    }

    /// Also hands every changed payload to `on_update`, after classification.
    pub fn forward_updates<F>(mut self, on_update: F) -> Self
    where
        F: Fn(&FeedFrame) + Send + Sync + 'static,
    {
        self.forward = Some(Arc::new(on_update));
        self
    }

    /// The monitor's policy.
    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }

    /// Subscribes to the monitor's feed.
    pub fn start(self, registry: &FeedRegistry) -> Result<MonitorHandle, FeedError> {
        let DomainMonitor {
            config,
            classifier,
            sink,
            forward,
        } = self;

        let classifier = Mutex::new(classifier);
        let update_sink = Arc::clone(&sink);
        let update_name = config.name.clone();
        let on_update = move |frame: &FeedFrame| {
            let alerts = classifier
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .classify(&frame.payload, Utc::now());
            for mut alert in alerts {
                alert.monitor = update_name.clone();
                update_sink.raise(&alert);
            }
            if let Some(forward) = &forward {
                forward(frame);
            }
        };

        let error_name = config.name.clone();
        let on_error = move |error: &FeedError| {
            if error.is_terminal() {
                let mut alert = Alert::new(
                    AlertKind::FeedUnavailable,
                    AlertSeverity::Critical,
                    format!("{error}"),
                );
                alert.monitor = error_name.clone();
                sink.raise(&alert);
            } else {
                log::warn!("[{}] {}", error_name, error);
            }
        };

        let options = SubscribeOptions::new(config.interval)
            .max_retries(config.max_retries)
            .backoff_multiplier(config.backoff_multiplier)
            .on_update(on_update)
            .on_error(on_error);
        let subscription = registry.subscribe(config.feed_key.clone(), options)?;
        log::info!(
            "Monitor '{}' watching feed '{}' every {:?}.",
            config.name,
            config.feed_key,
            config.interval
        );
        Ok(MonitorHandle {
            name: config.name,
            subscription,
        })
    }
}

/// A running monitor.
#[derive(Debug, Clone)]
pub struct MonitorHandle {
    name: String,
    subscription: SubscriptionHandle,
}

impl MonitorHandle {
    /// Monitor name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The underlying feed subscription.
    pub fn subscription(&self) -> &SubscriptionHandle {
        &self.subscription
    }

    /// Detaches the monitor from its feed. Idempotent.
    pub fn stop(&self, registry: &FeedRegistry) -> bool {
        registry.unsubscribe(&self.subscription)
    }
}

/// Entries of a payload: a top-level array, an array under `data`, or the
/// object itself.
pub(crate) fn entries(payload: &Value) -> Vec<&Value> {
    match payload {
        Value::Array(items) => items.iter().collect(),
        Value::Object(map) => match map.get("data") {
            Some(Value::Array(items)) => items.iter().collect(),
            _ => vec![payload],
        },
        _ => Vec::new(),
    }
}

/// The `id` of an entry, whether string or number.
pub(crate) fn entry_id(entry: &Value) -> Option<String> {
    match entry.get("id")? {
        Value::String(id) => Some(id.clone()),
        Value::Number(id) => Some(id.to_string()),
        _ => None,
    }
}

/// A numeric field given either as a JSON number or as a numeric string.
pub(crate) fn number_field(entry: &Value, field: &str) -> Option<f64> {
    match entry.get(field)? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// A string field.
pub(crate) fn str_field<'a>(entry: &'a Value, field: &str) -> Option<&'a str> {
    entry.get(field).and_then(Value::as_str)
}

/// Display label: `name`, else `id`, else `unknown`.
pub(crate) fn label(entry: &Value) -> String {
    str_field(entry, "name")
        .map(str::to_string)
        .or_else(|| entry_id(entry))
        .unwrap_or_else(|| "unknown".to_string())
}
