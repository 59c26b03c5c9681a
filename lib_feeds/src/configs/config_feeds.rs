//! # Engine Settings
//!
//! Registry-wide knobs that are not owned by any single feed. Settings can be
//! built in code, parsed from a JSON document, or loaded from a file, e.g.
//!
//! ```json
//! { "quickRestartMs": 1000, "maxDelayCapMs": 60000, "fetchTimeoutMs": 30000 }
//! ```
//!
//! Missing fields fall back to their defaults.

use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::backoff::MAX_DELAY_CAP;

/// Errors raised while loading [`FeedSettings`].
#[derive(Debug, Error)]
pub enum SettingsError {
    /// The settings file could not be read.
    #[error("I/O error occurred: {0}")]
    IoError(#[from] std::io::Error),

    /// The settings document is not valid JSON for this schema.
    #[error("JSON parse error: {0}")]
    JsonError(#[from] serde_json::Error),

    /// A value is out of range.
    #[error("invalid setting: {0}")]
    Invalid(String),
}

/// # Feed Settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FeedSettings {
    /// Delay before the first fetch after the host becomes visible again.
    pub quick_restart_ms: u64,
    /// Ceiling for retry delays. Never above the 60 s hard cap.
    pub max_delay_cap_ms: u64,
    /// Fetches still pending after this long fail with a timeout.
    pub fetch_timeout_ms: Option<u64>,
}

impl Default for FeedSettings {
    fn default() -> Self {
        Self {
            quick_restart_ms: 1000,
            max_delay_cap_ms: MAX_DELAY_CAP.as_millis() as u64,
            fetch_timeout_ms: Some(30_000),
        }
    }
}

impl FeedSettings {
    /// Parses and validates a JSON document.
    pub fn from_json_str(json: &str) -> Result<Self, SettingsError> {
        let settings: FeedSettings = serde_json::from_str(json)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Reads, parses and validates a JSON file.
    pub fn from_file(path: &Path) -> Result<Self, SettingsError> {
        let json = fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    /// Rejects zero delays and zero timeouts.
    pub fn validate(&self) -> Result<(), SettingsError> {
        if self.quick_restart_ms == 0 {
            return Err(SettingsError::Invalid("quickRestartMs must be greater than zero".into()));
        }
        if self.max_delay_cap_ms == 0 {
            return Err(SettingsError::Invalid("maxDelayCapMs must be greater than zero".into()));
        }
        if self.fetch_timeout_ms == Some(0) {
            return Err(SettingsError::Invalid("fetchTimeoutMs must be greater than zero".into()));
        }
        Ok(())
    }

    /// Quick-restart delay used when a paused loop resumes.
    pub fn quick_restart(&self) -> Duration {
        Duration::from_millis(self.quick_restart_ms)
    }

    /// Retry ceiling, clamped to the hard cap.
    pub fn max_delay_cap(&self) -> Duration {
        Duration::from_millis(self.max_delay_cap_ms).min(MAX_DELAY_CAP)
    }

    /// Per-fetch timeout, if any.
    pub fn fetch_timeout(&self) -> Option<Duration> {
        self.fetch_timeout_ms.map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults() {
        let settings = FeedSettings::default();
        assert_eq!(settings.quick_restart(), Duration::from_millis(1000));
        assert_eq!(settings.max_delay_cap(), Duration::from_millis(60_000));
        assert_eq!(settings.fetch_timeout(), Some(Duration::from_secs(30)));
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let settings = FeedSettings::from_json_str(r#"{ "quickRestartMs": 250 }"#).unwrap();
        assert_eq!(settings.quick_restart(), Duration::from_millis(250));
        assert_eq!(settings.max_delay_cap_ms, 60_000);
    }

    #[test]
    fn cap_is_clamped() {
        let settings = FeedSettings::from_json_str(r#"{ "maxDelayCapMs": 600000 }"#).unwrap();
        assert_eq!(settings.max_delay_cap(), MAX_DELAY_CAP);
    }

    #[test]
    fn rejects_zero_values() {
        assert!(matches!(
            FeedSettings::from_json_str(r#"{ "quickRestartMs": 0 }"#),
            Err(SettingsError::Invalid(_))
        ));
        assert!(matches!(
            FeedSettings::from_json_str(r#"{ "fetchTimeoutMs": 0 }"#),
            Err(SettingsError::Invalid(_))
        ));
        assert!(matches!(
            FeedSettings::from_json_str("{ not json"),
            Err(SettingsError::JsonError(_))
        ));
    }

    #[test]
    fn loads_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{ "quickRestartMs": 500, "fetchTimeoutMs": null }}"#).unwrap();
        let settings = FeedSettings::from_file(file.path()).unwrap();
        assert_eq!(settings.quick_restart_ms, 500);
        assert_eq!(settings.fetch_timeout(), None);
    }
}
