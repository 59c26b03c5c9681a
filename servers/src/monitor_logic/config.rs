use clap::Parser;
use lib_feeds::configs::{FeedSettings, SettingsError};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Default name of the JSON configuration file.
pub const DEFAULT_CONFIG_FILE: &str = "server_monitors.conf";

#[derive(Parser, Deserialize, Serialize, Debug, Clone, Default, PartialEq)]
#[clap(about = "Polls the site API feeds and raises equipment, AI analysis, quality and dashboard alerts", version)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    #[clap(long, env = "FEEDS_CONFIG_PATH", help = "Path to the JSON configuration file.")]
    pub config_path: Option<PathBuf>,

    #[clap(long, env = "FEEDS_LOG_DIR", help = "Directory for log files.")]
    pub log_dir: Option<PathBuf>,

    #[clap(long, env = "FEEDS_LOG_LEVEL", help = "Logging level (trace, debug, info, warn, error).")]
    pub log_level: Option<String>,

    #[clap(long, env = "FEEDS_API_BASE_URL", help = "Absolute base URL of the REST API.")]
    pub api_base_url: Option<String>,

    #[clap(long, env = "FEEDS_API_TOKEN", help = "Bearer token sent with every request.")]
    pub api_token: Option<String>,

    #[clap(long, env = "FEEDS_QUICK_RESTART_MS", help = "Delay in milliseconds before the first fetch after the host becomes visible again.")]
    pub quick_restart_ms: Option<u64>,

    #[clap(long, env = "FEEDS_MAX_DELAY_CAP_MS", help = "Ceiling in milliseconds for retry delays (at most 60000).")]
    pub max_delay_cap_ms: Option<u64>,

    #[clap(long, env = "FEEDS_FETCH_TIMEOUT_MS", help = "Per-fetch timeout in milliseconds.")]
    pub fetch_timeout_ms: Option<u64>,

    #[clap(long, env = "FEEDS_STATUS_INTERVAL_SECONDS", help = "Interval in seconds between feed status reports.")]
    pub status_interval_seconds: Option<u64>,

    #[clap(long, env = "FEEDS_EQUIPMENT_PATH", help = "API path of the equipment feed.")]
    pub equipment_path: Option<String>,

    #[clap(long, env = "FEEDS_AI_ANALYSIS_PATH", help = "API path of the AI analysis feed.")]
    pub ai_analysis_path: Option<String>,

    #[clap(long, env = "FEEDS_QUALITY_PATH", help = "API path of the quality-check feed.")]
    pub quality_path: Option<String>,

    #[clap(long, env = "FEEDS_DASHBOARD_PATH", help = "API path of the dashboard feed.")]
    pub dashboard_path: Option<String>,
}

impl Config {
    // Merge two Config structs, where 'other' overrides 'self' for Some values
    fn merge(self, other: Config) -> Config {
        Config {
            config_path: other.config_path.or(self.config_path),
            log_dir: other.log_dir.or(self.log_dir),
            log_level: other.log_level.or(self.log_level),
            api_base_url: other.api_base_url.or(self.api_base_url),
            api_token: other.api_token.or(self.api_token),
            quick_restart_ms: other.quick_restart_ms.or(self.quick_restart_ms),
            max_delay_cap_ms: other.max_delay_cap_ms.or(self.max_delay_cap_ms),
            fetch_timeout_ms: other.fetch_timeout_ms.or(self.fetch_timeout_ms),
            status_interval_seconds: other.status_interval_seconds.or(self.status_interval_seconds),
            equipment_path: other.equipment_path.or(self.equipment_path),
            ai_analysis_path: other.ai_analysis_path.or(self.ai_analysis_path),
            quality_path: other.quality_path.or(self.quality_path),
            dashboard_path: other.dashboard_path.or(self.dashboard_path),
        }
    }

    /// Built-in values, the lowest-priority layer.
    pub fn defaults() -> Config {
        let engine = FeedSettings::default();
        Config {
            log_dir: Some(PathBuf::from("./logs")),
            log_level: Some("info".to_string()),
            api_base_url: Some("http://localhost:3000/api/".to_string()),
            quick_restart_ms: Some(engine.quick_restart_ms),
            max_delay_cap_ms: Some(engine.max_delay_cap_ms),
            fetch_timeout_ms: engine.fetch_timeout_ms,
            status_interval_seconds: Some(60),
            ..Default::default()
        }
    }

    /// Engine settings carried by this configuration.
    pub fn feed_settings(&self) -> Result<FeedSettings, SettingsError> {
        let defaults = FeedSettings::default();
        let settings = FeedSettings {
            quick_restart_ms: self.quick_restart_ms.unwrap_or(defaults.quick_restart_ms),
            max_delay_cap_ms: self.max_delay_cap_ms.unwrap_or(defaults.max_delay_cap_ms),
            fetch_timeout_ms: self.fetch_timeout_ms.or(defaults.fetch_timeout_ms),
        };
        settings.validate()?;
        Ok(settings)
    }

    /// Feed key to API path overrides, for the paths that are set.
    pub fn routes(&self) -> Vec<(&'static str, String)> {
        use lib_feeds::monitors::{ai_analysis, dashboard, equipment, quality};
        [
            (equipment::FEED_KEY, &self.equipment_path),
            (ai_analysis::FEED_KEY, &self.ai_analysis_path),
            (quality::FEED_KEY, &self.quality_path),
            (dashboard::FEED_KEY, &self.dashboard_path),
        ]
        .into_iter()
        .filter_map(|(key, path)| path.clone().map(|p| (key, p)))
        .collect()
    }
}

/// Reads a configuration file layer. Missing or unreadable files yield `None`.
pub fn read_config_file(path: &Path) -> Option<Config> {
    if !path.exists() {
        log::info!("Config file not found at {}. Using defaults and environment/CLI variables.", path.display());
        return None;
    }
    match fs::read_to_string(path) {
        Ok(config_str) => match serde_json::from_str::<Config>(&config_str) {
            Ok(file_config) => Some(file_config),
            Err(e) => {
                log::warn!("Failed to parse config file {}: {}. Falling back to other sources.", path.display(), e);
                None
            }
        },
        Err(e) => {
            log::warn!("Failed to read config file {}: {}. Falling back to other sources.", path.display(), e);
            None
        }
    }
}

/// Layers defaults, then the config file, then CLI arguments and environment.
pub fn resolve_config(cli_args: Config) -> Config {
    let config_file_path = cli_args
        .config_path
        .clone()
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));

    let mut current_config = Config::defaults();
    if let Some(file_config) = read_config_file(&config_file_path) {
        current_config = current_config.merge(file_config);
    }
    current_config.merge(cli_args)
}

pub fn load_config() -> Config {
    // clap handles both the command line and the FEEDS_* environment variables.
    resolve_config(Config::parse())
}
