//! # lib_feeds
//!
//! Real-time feed synchronization: keeps independent JSON feeds fresh by
//! polling, delivers only changed payloads, backs off on failure, and pauses
//! every feed while the host is hidden. Domain monitors build alerting on top.
//!
//! The engine (`core`), its settings (`configs`) and the monitors are always
//! compiled. HTTP fetching (`retrieve`) and process logging (`loggers`) are
//! feature-gated.

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, unused_qualifications)]

/// Registry-wide engine settings.
pub mod configs;
/// The feed synchronization engine.
pub mod core;
/// Alerting monitors for the equipment, AI analysis, quality and dashboard feeds.
pub mod monitors;

/// Stdout and rotating file logging.
#[cfg(feature = "loggers")]
pub mod loggers;
/// HTTP client and feed fetcher.
#[cfg(feature = "retrieve")]
pub mod retrieve;

pub use crate::configs::FeedSettings;
pub use crate::core::{
    FeedError, FeedFetcher, FeedFrame, FeedKey, FeedRegistry, FetchError, SubscribeOptions,
    SubscriptionHandle, Visibility, VisibilityController,
};
pub use crate::monitors::{Alert, AlertKind, AlertSeverity, AlertSink, LogAlertSink, MonitorHandle};
