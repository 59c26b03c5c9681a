//! AI plan analysis: announces analyses the moment they finish.
//!
//! An analysis is finished when its `status` is `completed` and its `progress`
//! is 100. Only the transition is announced. Analyses that are already
//! finished the first time the monitor sees them stay silent.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde_json::{json, Value};

use crate::core::{FeedError, FeedRegistry};
use crate::monitors::{
    entries, entry_id, label, number_field, str_field, Alert, AlertKind, AlertSeverity, AlertSink,
    Classifier, DomainMonitor, MonitorConfig, MonitorHandle,
};

/// Feed key of the AI analysis endpoint.
pub const FEED_KEY: &str = "ai-analysis";

/// 2 s interval, 3 retries, 2.0 multiplier.
pub fn config() -> MonitorConfig {
    MonitorConfig::new("ai_analysis", FEED_KEY, Duration::from_millis(2_000))
        .max_retries(3)
        .backoff_multiplier(2.0)
}

fn is_finished(entry: &Value) -> bool {
    str_field(entry, "status") == Some("completed")
        && number_field(entry, "progress").is_some_and(|p| p == 100.0)
}

/// Tracks the finished state of each analysis between payloads.
#[derive(Debug, Clone, Default)]
pub struct AnalysisClassifier {
    finished: HashMap<String, bool>,
    primed: bool,
}

impl Classifier for AnalysisClassifier {
    fn classify(&mut self, payload: &Value, _now: DateTime<Utc>) -> Vec<Alert> {
        let mut alerts = Vec::new();
        let mut finished = HashMap::new();

        for (index, entry) in entries(payload).into_iter().enumerate() {
            let id = entry_id(entry).unwrap_or_else(|| format!("#{index}"));
            let done = is_finished(entry);
            let was_done = self.finished.get(&id).copied().unwrap_or(false);

            if self.primed && done && !was_done {
                let confidence = number_field(entry, "aiConfidence");
                let message = match confidence {
                    Some(c) => format!("AI analysis {} completed (confidence {:.0}%)", label(entry), c * 100.0),
                    None => format!("AI analysis {} completed", label(entry)),
                };
                alerts.push(
                    Alert::new(AlertKind::AnalysisCompleted, AlertSeverity::Info, message)
                        .with_subject(Some(id.clone()))
                        .with_details(json!({ "confidence": confidence })),
                );
            }
            finished.insert(id, done);
        }

        self.finished = finished;
        self.primed = true;
        alerts
    }
}

/// The AI analysis monitor, not yet started.
pub fn monitor(sink: Arc<dyn AlertSink>) -> DomainMonitor {
    DomainMonitor::new(config(), AnalysisClassifier::default(), sink)
}

/// Starts the AI analysis monitor on `registry`.
pub fn start(registry: &FeedRegistry, sink: Arc<dyn AlertSink>) -> Result<MonitorHandle, FeedError> {
    monitor(sink).start(registry)
}
