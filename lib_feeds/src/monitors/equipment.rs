//! Equipment telemetry: flags machines that go offline or run low on battery.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde_json::{json, Value};

use crate::core::{FeedError, FeedRegistry};
use crate::monitors::{
    entries, entry_id, label, number_field, str_field, Alert, AlertKind, AlertSeverity, AlertSink,
    Classifier, DomainMonitor, MonitorConfig, MonitorHandle,
};

/// Feed key of the equipment endpoint.
pub const FEED_KEY: &str = "equipment";
/// Battery percentage below which a warning is raised.
pub const LOW_BATTERY_THRESHOLD: f64 = 20.0;

/// 3 s interval, 5 retries, 1.2 multiplier.
pub fn config() -> MonitorConfig {
    MonitorConfig::new("equipment", FEED_KEY, Duration::from_millis(3_000))
        .max_retries(5)
        .backoff_multiplier(1.2)
}

/// Raises one alert per offline unit and one per unit with a low battery.
#[derive(Debug, Clone, Default)]
pub struct EquipmentClassifier;

impl Classifier for EquipmentClassifier {
    fn classify(&mut self, payload: &Value, _now: DateTime<Utc>) -> Vec<Alert> {
        let mut alerts = Vec::new();
        for entry in entries(payload) {
            let name = label(entry);
            if str_field(entry, "status") == Some("offline") {
                alerts.push(
                    Alert::new(
                        AlertKind::EquipmentOffline,
                        AlertSeverity::Critical,
                        format!("Equipment {name} is offline"),
                    )
                    .with_subject(entry_id(entry)),
                );
            }
            if let Some(level) = number_field(entry, "batteryLevel") {
                if level < LOW_BATTERY_THRESHOLD {
                    alerts.push(
                        Alert::new(
                            AlertKind::LowBattery,
                            AlertSeverity::Warning,
                            format!("Equipment {name} battery at {level}%"),
                        )
                        .with_subject(entry_id(entry))
                        .with_details(json!({ "batteryLevel": level })),
                    );
                }
            }
        }
        alerts
    }
}

/// The equipment monitor, not yet started.
pub fn monitor(sink: Arc<dyn AlertSink>) -> DomainMonitor {
    DomainMonitor::new(config(), EquipmentClassifier, sink)
}

/// Starts the equipment monitor on `registry`.
pub fn start(registry: &FeedRegistry, sink: Arc<dyn AlertSink>) -> Result<MonitorHandle, FeedError> {
    monitor(sink).start(registry)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(alerts: &[Alert]) -> Vec<AlertKind> {
        alerts.iter().map(|a| a.kind).collect()
    }

    #[test]
    fn offline_and_low_battery_raise_two_alerts() {
        let payload = json!([{ "id": 1, "status": "offline", "batteryLevel": 15 }]);
        let alerts = EquipmentClassifier.classify(&payload, Utc::now());
        assert_eq!(kinds(&alerts), vec![AlertKind::EquipmentOffline, AlertKind::LowBattery]);
        assert_eq!(alerts[0].severity, AlertSeverity::Critical);
        assert_eq!(alerts[0].subject.as_deref(), Some("1"));
    }

    #[test]
    fn active_with_low_battery_raises_one_alert() {
        let payload = json!([{ "id": 1, "status": "active", "batteryLevel": 15 }]);
        let alerts = EquipmentClassifier.classify(&payload, Utc::now());
        assert_eq!(kinds(&alerts), vec![AlertKind::LowBattery]);
    }

    #[test]
    fn threshold_is_exclusive() {
        let payload = json!({ "data": [{ "id": "a", "status": "active", "batteryLevel": 20 }] });
        assert!(EquipmentClassifier.classify(&payload, Utc::now()).is_empty());
    }

    #[test]
    fn policy() {
        let config = config();
        assert_eq!(config.interval, Duration::from_secs(3));
        assert_eq!(config.max_retries, 5);
        assert_eq!(config.backoff_multiplier, 1.2);
    }
}
