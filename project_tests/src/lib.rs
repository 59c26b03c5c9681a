//! # Test Fixtures
//!
//! Shared helpers for the integration tests under `tests/`:
//!
//! - [`ScriptedFetcher`]: a [`FeedFetcher`] that replays scripted results per
//!   feed key, with optional latency, and records how it was called.
//! - [`UpdateLog`]: collects the frames and errors delivered to a subscriber.
//! - [`RecordingSink`]: collects the alerts raised by monitors.
//!
//! All fixtures are meant for `#[tokio::test(start_paused = true)]`, where
//! `tokio::time::sleep` in the test body drives the poll loops deterministically.

#![forbid(unsafe_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::future::{BoxFuture, FutureExt};
use serde_json::Value;

use lib_feeds::configs::FeedSettings;
use lib_feeds::core::{
    FeedError, FeedFetcher, FeedFrame, FeedKey, FeedRegistry, FetchError, FetchResult, SubscribeOptions,
    Visibility, VisibilityController,
};
use lib_feeds::monitors::{Alert, AlertKind, AlertSink};

/// A successful fetch result.
pub fn ok(payload: Value) -> FetchResult {
    Ok(payload)
}

/// A failed fetch result.
pub fn fail(message: &str) -> FetchResult {
    Err(FetchError::Network(message.to_string()))
}

#[derive(Default)]
struct Script {
    queue: VecDeque<FetchResult>,
    last: Option<FetchResult>,
}

impl Script {
    fn new(responses: Vec<FetchResult>) -> Self {
        Self {
            queue: responses.into(),
            last: None,
        }
    }

    // Replays the queue, then repeats the last result forever.
    fn next(&mut self) -> FetchResult {
        if let Some(result) = self.queue.pop_front() {
            self.last = Some(result.clone());
            return result;
        }
        self.last
            .clone()
            .unwrap_or_else(|| Err(FetchError::Malformed("empty script".into())))
    }
}

#[derive(Default)]
struct Inner {
    default_script: Mutex<Script>,
    scripts: Mutex<HashMap<FeedKey, Script>>,
    latency: Mutex<Duration>,
    calls: Mutex<Vec<FeedKey>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

/// # Scripted Fetcher
///
/// Cheap to clone; clones share scripts and counters.
#[derive(Clone, Default)]
pub struct ScriptedFetcher {
    inner: Arc<Inner>,
}

impl ScriptedFetcher {
    /// Replays `responses` for every key without a script of its own.
    pub fn new(responses: Vec<FetchResult>) -> Self {
        let fetcher = Self::default();
        *fetcher.inner.default_script.lock().unwrap() = Script::new(responses);
        fetcher
    }

    /// Replays `responses` for `key`.
    pub fn for_key(self, key: impl Into<FeedKey>, responses: Vec<FetchResult>) -> Self {
        self.inner
            .scripts
            .lock()
            .unwrap()
            .insert(key.into(), Script::new(responses));
        self
    }

    /// Every fetch takes `latency` before resolving.
    pub fn with_latency(self, latency: Duration) -> Self {
        *self.inner.latency.lock().unwrap() = latency;
        self
    }

    /// Total fetches started.
    pub fn calls(&self) -> usize {
        self.inner.calls.lock().unwrap().len()
    }

    /// Fetches started for `key`.
    pub fn calls_for(&self, key: impl Into<FeedKey>) -> usize {
        let key = key.into();
        self.inner.calls.lock().unwrap().iter().filter(|k| **k == key).count()
    }

    /// Highest number of fetches that were running at the same time.
    pub fn max_in_flight(&self) -> usize {
        self.inner.max_in_flight.load(Ordering::SeqCst)
    }

    fn next_result(&self, key: &FeedKey) -> FetchResult {
        let mut scripts = self.inner.scripts.lock().unwrap();
        match scripts.get_mut(key) {
            Some(script) => script.next(),
            None => self.inner.default_script.lock().unwrap().next(),
        }
    }
}

impl FeedFetcher for ScriptedFetcher {
    fn fetch(&self, key: &FeedKey) -> BoxFuture<'static, FetchResult> {
        self.inner.calls.lock().unwrap().push(key.clone());
        let result = self.next_result(key);
        let latency = *self.inner.latency.lock().unwrap();
        let inner = Arc::clone(&self.inner);

        async move {
            let running = inner.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            inner.max_in_flight.fetch_max(running, Ordering::SeqCst);
            if !latency.is_zero() {
                tokio::time::sleep(latency).await;
            }
            inner.in_flight.fetch_sub(1, Ordering::SeqCst);
            result
        }
        .boxed()
    }
}

/// A registry over `fetcher` with its own visibility controller and default settings.
pub fn registry(fetcher: &ScriptedFetcher) -> (FeedRegistry, Arc<VisibilityController>) {
    registry_with(fetcher, FeedSettings::default(), Visibility::Visible)
}

/// A registry over `fetcher` with custom settings and initial visibility.
pub fn registry_with(
    fetcher: &ScriptedFetcher,
    settings: FeedSettings,
    initial: Visibility,
) -> (FeedRegistry, Arc<VisibilityController>) {
    let visibility = Arc::new(VisibilityController::with_state(initial));
    let registry = FeedRegistry::new(Arc::new(fetcher.clone()), Arc::clone(&visibility), settings);
    (registry, visibility)
}

/// # Update Log
///
/// Records what one subscriber receives.
#[derive(Clone, Default)]
pub struct UpdateLog {
    frames: Arc<Mutex<Vec<FeedFrame>>>,
    errors: Arc<Mutex<Vec<FeedError>>>,
}

impl UpdateLog {
    /// Empty log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Options polling every `interval` that record into this log.
    pub fn options(&self, interval: Duration) -> SubscribeOptions {
        let frames = Arc::clone(&self.frames);
        let errors = Arc::clone(&self.errors);
        SubscribeOptions::new(interval)
            .on_update(move |frame: &FeedFrame| frames.lock().unwrap().push(frame.clone()))
            .on_error(move |error: &FeedError| errors.lock().unwrap().push(error.clone()))
    }

    /// Payloads received so far.
    pub fn payloads(&self) -> Vec<Value> {
        self.frames
            .lock()
            .unwrap()
            .iter()
            .map(|f| f.payload.as_ref().clone())
            .collect()
    }

    /// Frames received so far.
    pub fn frames(&self) -> Vec<FeedFrame> {
        self.frames.lock().unwrap().clone()
    }

    /// Errors received so far.
    pub fn errors(&self) -> Vec<FeedError> {
        self.errors.lock().unwrap().clone()
    }
}

/// # Recording Sink
#[derive(Clone, Default)]
pub struct RecordingSink {
    alerts: Arc<Mutex<Vec<Alert>>>,
}

impl RecordingSink {
    /// Empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// This sink as a shareable trait object.
    pub fn shared(&self) -> Arc<dyn AlertSink> {
        Arc::new(self.clone())
    }

    /// Alerts raised so far.
    pub fn alerts(&self) -> Vec<Alert> {
        self.alerts.lock().unwrap().clone()
    }

    /// Kinds of the alerts raised so far, in order.
    pub fn kinds(&self) -> Vec<AlertKind> {
        self.alerts.lock().unwrap().iter().map(|a| a.kind).collect()
    }
}

impl AlertSink for RecordingSink {
    fn raise(&self, alert: &Alert) {
        self.alerts.lock().unwrap().push(alert.clone());
    }
}

/// Lets spawned loops run, advancing the paused clock by `ms` milliseconds.
pub async fn advance_ms(ms: u64) {
    tokio::time::sleep(Duration::from_millis(ms)).await;
}
