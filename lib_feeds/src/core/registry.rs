//! # Feed Registry
//!
//! Subscription manager keyed by [`FeedKey`]. The first subscriber to a key
//! creates a [`PollLoop`] and triggers its eager first fetch; later subscribers
//! share the running loop and only see future results. When the last
//! subscriber leaves, the loop is cancelled and forgotten: nothing lingers and
//! nothing is archived, so a later subscription starts from scratch.
//!
//! A loop that exhausts its retry budget removes itself from the registry.
//! Handles that pointed at it become inert; unsubscribing them is a no-op.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use crate::configs::FeedSettings;
use crate::core::backoff::BackoffPolicy;
use crate::core::dispatcher::{ErrorCallback, FeedFrame, UpdateCallback};
use crate::core::error::FeedError;
use crate::core::fetcher::FeedFetcher;
use crate::core::key::FeedKey;
use crate::core::poll_loop::{FeedSnapshot, LoopParams, PollLoop, PollLoopHandle};
use crate::core::visibility::VisibilityController;

/// Retry budget used when a subscription does not set one.
pub const DEFAULT_MAX_RETRIES: u32 = 3;
/// Backoff multiplier used when a subscription does not set one.
pub const DEFAULT_BACKOFF_MULTIPLIER: f64 = 2.0;

/// # Subscribe Options
///
/// What a subscriber wants from a feed. The retry policy (`max_retries`,
/// `backoff_multiplier`, `base_delay`) is fixed by whoever creates the loop;
/// subscribers joining a running loop only contribute their interval and
/// callbacks.
#[derive(Clone)]
pub struct SubscribeOptions {
    interval: Duration,
    on_update: UpdateCallback,
    on_error: ErrorCallback,
    max_retries: u32,
    backoff_multiplier: f64,
    base_delay: Option<Duration>,
}

impl SubscribeOptions {
    /// Options polling every `interval` with no-op callbacks and default retries.
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            on_update: Arc::new(|_: &FeedFrame| {}),
            on_error: Arc::new(|_: &FeedError| {}),
            max_retries: DEFAULT_MAX_RETRIES,
            backoff_multiplier: DEFAULT_BACKOFF_MULTIPLIER,
            base_delay: None,
        }
    }

    /// Called with every changed payload.
    pub fn on_update<F>(mut self, on_update: F) -> Self
    where
        F: Fn(&FeedFrame) + Send + Sync + 'static,
    {
        self.on_update = Arc::new(on_update);
        self
    }

    /// Called with every fetch failure, transient or terminal.
    pub fn on_error<F>(mut self, on_error: F) -> Self
    where
        F: Fn(&FeedError) + Send + Sync + 'static,
    {
        self.on_error = Arc::new(on_error);
        self
    }

    /// Consecutive failures tolerated before the feed is disposed.
    pub fn max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Growth factor of the retry delay. Must be greater than 1.
    pub fn backoff_multiplier(mut self, multiplier: f64) -> Self {
        self.backoff_multiplier = multiplier;
        self
    }

    /// Delay of the first retry. Defaults to the polling interval.
    pub fn base_delay(mut self, base_delay: Duration) -> Self {
        self.base_delay = Some(base_delay);
        self
    }

    /// Requested polling interval.
    pub fn interval(&self) -> Duration {
        self.interval
    }

    fn validate(&self, key: &FeedKey) -> Result<(), FeedError> {
        if !key.is_valid() {
            return Err(FeedError::InvalidKey(key.clone()));
        }
        if self.interval.is_zero() {
            return Err(FeedError::InvalidInterval(key.clone()));
        }
        if !self.backoff_multiplier.is_finite() || self.backoff_multiplier <= 1.0 {
            return Err(FeedError::InvalidOptions {
                key: key.clone(),
                reason: format!(
                    "backoff multiplier must be greater than 1, got {}",
                    self.backoff_multiplier
                ),
            });
        }
        if self.base_delay.is_some_and(|d| d.is_zero()) {
            return Err(FeedError::InvalidOptions {
                key: key.clone(),
                reason: "base delay must be greater than zero".into(),
            });
        }
        Ok(())
    }
}

/// # Subscription Handle
///
/// Returned by [`FeedRegistry::subscribe`]; pass it back to
/// [`FeedRegistry::unsubscribe`] to detach.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SubscriptionHandle {
    id: u64,
    key: FeedKey,
    generation: u64,
}

impl SubscriptionHandle {
    /// The subscribed feed.
    pub fn key(&self) -> &FeedKey {
        &self.key
    }
}

type FeedMap = HashMap<FeedKey, PollLoopHandle>;

fn lock(feeds: &Mutex<FeedMap>) -> MutexGuard<'_, FeedMap> {
    feeds.lock().unwrap_or_else(PoisonError::into_inner)
}

/// # Feed Registry
pub struct FeedRegistry {
    feeds: Arc<Mutex<FeedMap>>,
    fetcher: Arc<dyn FeedFetcher>,
    visibility: Arc<VisibilityController>,
    settings: FeedSettings,
    next_id: AtomicU64,
}

impl FeedRegistry {
    /// A registry driven by `fetcher` and the given visibility controller.
    pub fn new(
        fetcher: Arc<dyn FeedFetcher>,
        visibility: Arc<VisibilityController>,
        settings: FeedSettings,
    ) -> Self {
        Self {
            feeds: Arc::new(Mutex::new(HashMap::new())),
            fetcher,
            visibility,
            settings,
            next_id: AtomicU64::new(1),
        }
    }

    /// A registry observing the process-wide [`VisibilityController::global`].
    pub fn with_global_visibility(fetcher: Arc<dyn FeedFetcher>, settings: FeedSettings) -> Self {
        Self::new(fetcher, VisibilityController::global(), settings)
    }

    /// The controller this registry's loops observe.
    pub fn visibility(&self) -> &Arc<VisibilityController> {
        &self.visibility
    }

    /// Attaches a subscriber to `key`, creating and starting its poll loop if no
    /// live loop exists. Must be called from within a tokio runtime.
    pub fn subscribe(
        &self,
        key: impl Into<FeedKey>,
        options: SubscribeOptions,
    ) -> Result<SubscriptionHandle, FeedError> {
        let key = key.into();
        options.validate(&key)?;

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let mut feeds = lock(&self.feeds);

        if let Some(existing) = feeds.get(&key) {
            if !existing.is_disposed() {
                let count = existing.attach(id, options.interval, options.on_update, options.on_error);
                log::debug!("Subscriber {} joined feed '{}' ({} attached).", id, key, count);
                return Ok(SubscriptionHandle {
                    id,
                    key,
                    generation: existing.generation(),
                });
            }
        }

        let generation = id;
        let policy = BackoffPolicy::new(
            options.base_delay.unwrap_or(options.interval),
            options.backoff_multiplier,
            options.max_retries,
        )
        .with_max_delay(self.settings.max_delay_cap());
        let params = LoopParams {
            key: key.clone(),
            generation,
            policy,
            fallback_interval: options.interval,
            quick_restart: self.settings.quick_restart(),
            fetch_timeout: self.settings.fetch_timeout(),
        };

        let on_disposed = {
            let feeds: Weak<Mutex<FeedMap>> = Arc::downgrade(&self.feeds);
            let key = key.clone();
            Box::new(move || {
                if let Some(feeds) = feeds.upgrade() {
                    let mut feeds = lock(&feeds);
                    if feeds.get(&key).is_some_and(|h| h.generation() == generation) {
                        feeds.remove(&key);
                        log::info!("Feed '{}' removed after exhausting its retries.", key);
                    }
                }
            })
        };

        let (poll_loop, handle) =
            PollLoop::new(params, Arc::clone(&self.fetcher), self.visibility.observe(), on_disposed);
        handle.attach(id, options.interval, options.on_update, options.on_error);
        if let Some(stale) = feeds.insert(key.clone(), handle) {
            stale.cancel();
        }
        drop(feeds);

        poll_loop.start();
        log::info!(
            "Feed '{}' created (interval {:?}, max retries {}).",
            key,
            options.interval,
            options.max_retries
        );
        Ok(SubscriptionHandle { id, key, generation })
    }

    /// Detaches a subscriber. When it was the last one, the feed's loop is
    /// cancelled and removed. Returns `false` if the handle was already detached
    /// or its feed no longer exists; calling it twice is harmless.
    pub fn unsubscribe(&self, handle: &SubscriptionHandle) -> bool {
        let mut feeds = lock(&self.feeds);
        let Some(feed) = feeds.get(&handle.key) else {
            return false;
        };
        if feed.generation() != handle.generation {
            return false;
        }
        match feed.detach(handle.id) {
            None => false,
            Some(0) => {
                if let Some(feed) = feeds.remove(&handle.key) {
                    feed.cancel();
                }
                log::info!("Feed '{}' has no subscribers left; disposed.", handle.key);
                true
            }
            Some(remaining) => {
                log::debug!(
                    "Subscriber {} left feed '{}' ({} remaining).",
                    handle.id,
                    handle.key,
                    remaining
                );
                true
            }
        }
    }

    /// Diagnostics for a live feed.
    pub fn snapshot(&self, key: &FeedKey) -> Option<FeedSnapshot> {
        lock(&self.feeds).get(key).map(PollLoopHandle::snapshot)
    }

    /// `true` if a live loop exists for `key`.
    pub fn contains(&self, key: &FeedKey) -> bool {
        lock(&self.feeds).contains_key(key)
    }

    /// Number of live feeds.
    pub fn feed_count(&self) -> usize {
        lock(&self.feeds).len()
    }

    /// Cancels every loop. Existing handles become inert.
    pub fn shutdown(&self) {
        let mut feeds = lock(&self.feeds);
        for (key, feed) in feeds.drain() {
            feed.cancel();
            log::debug!("Feed '{}' cancelled at shutdown.", key);
        }
    }
}

impl Drop for FeedRegistry {
    fn drop(&mut self) {
        self.shutdown();
    }
}
