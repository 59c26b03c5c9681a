//! # Configuration Modules
//!
//! Registry-wide engine settings. Per-feed policy (interval, retry budget,
//! multiplier) travels with each subscription instead.

/// Quick-restart delay, retry ceiling and fetch timeout.
pub mod config_feeds;

pub use config_feeds::{FeedSettings, SettingsError};
