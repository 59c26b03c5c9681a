//! # Poll Loop
//!
//! One [`PollLoop`] runs per feed key as a spawned task and is the only place
//! that ever fetches that feed. It walks an explicit state machine:
//!
//! ```text
//! Idle ─► Fetching ─┬─► Delivering ─► Scheduled ─► Fetching ...
//!                   └─► Backoff ────┬─► Scheduled ─► Fetching ...
//!                                   └─► Disposed (retry budget exhausted)
//! Scheduled/Backoff ─(hidden)─► Paused ─(visible)─► Scheduled (quick restart)
//! any ─(last subscriber gone)─► Disposed
//! ```
//!
//! ## Guarantees:
//! - **One fetch in flight**: the task awaits each fetch and fully processes its
//!   outcome (delivery or backoff) before it can arm the next timer, so fetches
//!   for a feed never overlap and deliveries are processed in order.
//! - **No fetch while hidden**: visibility is checked before every fetch and
//!   while waiting on any timer.
//! - **Deterministic cancellation**: the registry cancels the loop's
//!   `CancellationToken`; a pending timer is dropped immediately and an
//!   in-flight fetch is allowed to finish but its result is discarded.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde_json::Value;
use tokio::sync::Notify;
use tokio::time::{sleep_until, Instant};
use tokio_util::sync::CancellationToken;

use crate::core::backoff::BackoffPolicy;
use crate::core::change::ChangeDetector;
use crate::core::dispatcher::{Dispatcher, ErrorCallback, FeedFrame, UpdateCallback};
use crate::core::error::{FeedError, FetchError};
use crate::core::fetcher::{FeedFetcher, FetchResult};
use crate::core::key::FeedKey;
use crate::core::visibility::{Visibility, VisibilityObserver};

/// States of a feed's poll loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LoopState {
    /// Created, no timer armed yet.
    Idle,
    /// Waiting on the interval, backoff or quick-restart timer.
    Scheduled,
    /// Exactly one fetch in flight.
    Fetching,
    /// Handing a changed payload to subscribers.
    Delivering,
    /// Recording a failure and choosing the retry delay.
    Backoff,
    /// Suspended while the host is hidden.
    Paused,
    /// Stopped for good.
    Disposed,
}

/// # Feed Snapshot
///
/// Point-in-time view of one feed, for diagnostics and tests.
#[derive(Debug, Clone)]
pub struct FeedSnapshot {
    /// Feed key.
    pub key: FeedKey,
    /// Current loop state.
    pub state: LoopState,
    /// Attached subscribers.
    pub subscriber_count: usize,
    /// Minimum interval over the attached subscribers.
    pub effective_interval: Option<Duration>,
    /// Consecutive failures since the last success.
    pub retry_count: u32,
    /// Completion time of the last successful fetch.
    pub last_fetched_at: Option<Instant>,
    /// Last delivered payload.
    pub last_payload: Option<Arc<Value>>,
    /// Fetches started by this loop.
    pub fetch_count: u64,
    /// Changed payloads delivered by this loop.
    pub delivery_count: u64,
}

struct LoopShared {
    state: LoopState,
    dispatcher: Dispatcher,
    last_payload: Option<Arc<Value>>,
    last_fetched_at: Option<Instant>,
    retry_count: u32,
    fetch_count: u64,
    delivery_count: u64,
}

fn lock(shared: &Mutex<LoopShared>) -> MutexGuard<'_, LoopShared> {
    shared.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Per-loop parameters fixed at creation.
pub(crate) struct LoopParams {
    pub(crate) key: FeedKey,
    pub(crate) generation: u64,
    pub(crate) policy: BackoffPolicy,
    pub(crate) fallback_interval: Duration,
    pub(crate) quick_restart: Duration,
    pub(crate) fetch_timeout: Option<Duration>,
}

/// The registry's side of a loop: subscriber management and cancellation.
pub(crate) struct PollLoopHandle {
    key: FeedKey,
    generation: u64,
    shared: Arc<Mutex<LoopShared>>,
    cancel: CancellationToken,
    reschedule: Arc<Notify>,
}

impl PollLoopHandle {
    pub(crate) fn generation(&self) -> u64 {
        self.generation
    }

    pub(crate) fn attach(
        &self,
        id: u64,
        interval: Duration,
        on_update: UpdateCallback,
        on_error: ErrorCallback,
    ) -> usize {
        let count = {
            let mut shared = lock(&self.shared);
            shared.dispatcher.add(id, interval, on_update, on_error);
            shared.dispatcher.len()
        };
        self.reschedule.notify_one();
        count
    }

    /// Detaches subscriber `id` and returns the remaining count, or `None` if
    /// the subscriber was not attached.
    pub(crate) fn detach(&self, id: u64) -> Option<usize> {
        let remaining = {
            let mut shared = lock(&self.shared);
            if !shared.dispatcher.remove(id) {
                return None;
            }
            shared.dispatcher.len()
        };
        self.reschedule.notify_one();
        Some(remaining)
    }

    pub(crate) fn is_disposed(&self) -> bool {
        self.cancel.is_cancelled() || lock(&self.shared).state == LoopState::Disposed
    }

    pub(crate) fn cancel(&self) {
        self.cancel.cancel();
    }

    pub(crate) fn snapshot(&self) -> FeedSnapshot {
        let shared = lock(&self.shared);
        FeedSnapshot {
            key: self.key.clone(),
            state: shared.state,
            subscriber_count: shared.dispatcher.len(),
            effective_interval: shared.dispatcher.effective_interval(),
            retry_count: shared.retry_count,
            last_fetched_at: shared.last_fetched_at,
            last_payload: shared.last_payload.clone(),
            fetch_count: shared.fetch_count,
            delivery_count: shared.delivery_count,
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Timer {
    /// Regular polling: the effective interval after the last fetch completed.
    /// Re-evaluated whenever the subscriber set changes.
    Interval { since: Instant },
    /// Backoff or quick-restart deadline.
    Fixed(Instant),
}

enum Step {
    Fetch,
    Wait(Timer),
    Pause,
    Dispose,
    Stop,
}

/// The task side of a feed.
pub(crate) struct PollLoop {
    key: FeedKey,
    policy: BackoffPolicy,
    fallback_interval: Duration,
    quick_restart: Duration,
    fetch_timeout: Option<Duration>,
    shared: Arc<Mutex<LoopShared>>,
    cancel: CancellationToken,
    reschedule: Arc<Notify>,
    fetcher: Arc<dyn FeedFetcher>,
    observer: VisibilityObserver,
    on_disposed: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl PollLoop {
    /// Builds an idle loop and its handle. Nothing runs until [`PollLoop::start`].
    pub(crate) fn new(
        params: LoopParams,
        fetcher: Arc<dyn FeedFetcher>,
        observer: VisibilityObserver,
        on_disposed: Box<dyn FnOnce() + Send + Sync>,
    ) -> (Self, PollLoopHandle) {
        let shared = Arc::new(Mutex::new(LoopShared {
            state: LoopState::Idle,
            dispatcher: Dispatcher::default(),
            last_payload: None,
            last_fetched_at: None,
            retry_count: 0,
            fetch_count: 0,
            delivery_count: 0,
        }));
        let cancel = CancellationToken::new();
        let reschedule = Arc::new(Notify::new());

        let handle = PollLoopHandle {
            key: params.key.clone(),
            generation: params.generation,
            shared: Arc::clone(&shared),
            cancel: cancel.clone(),
            reschedule: Arc::clone(&reschedule),
        };
        let poll_loop = Self {
            key: params.key,
            policy: params.policy,
            fallback_interval: params.fallback_interval,
            quick_restart: params.quick_restart,
            fetch_timeout: params.fetch_timeout,
            shared,
            cancel,
            reschedule,
            fetcher,
            observer,
            on_disposed: Some(on_disposed),
        };
        (poll_loop, handle)
    }

    /// Spawns the loop onto the current tokio runtime.
    pub(crate) fn start(self) {
        tokio::spawn(self.run());
    }

    async fn run(mut self) {
        log::debug!("Poll loop for feed '{}' started.", self.key);

        // Idle goes straight to an eager first fetch.
        let mut step = Step::Fetch;
        let exhausted = loop {
            step = match step {
                Step::Fetch => self.fetch_step().await,
                Step::Wait(timer) => self.wait(timer).await,
                Step::Pause => self.pause().await,
                Step::Dispose => break true,
                Step::Stop => break false,
            };
        };

        self.set_state(LoopState::Disposed);
        if exhausted {
            if let Some(on_disposed) = self.on_disposed.take() {
                on_disposed();
            }
        }
        log::debug!("Poll loop for feed '{}' disposed.", self.key);
    }

    async fn fetch_step(&mut self) -> Step {
        if self.cancel.is_cancelled() {
            return Step::Stop;
        }
        if self.observer.is_hidden() {
            return Step::Pause;
        }

        {
            let mut shared = lock(&self.shared);
            shared.state = LoopState::Fetching;
            shared.fetch_count += 1;
        }
        let outcome = self.fetch().await;

        if self.cancel.is_cancelled() {
            log::debug!("Discarding fetch result for disposed feed '{}'.", self.key);
            return Step::Stop;
        }

        let completed_at = Instant::now();
        match outcome {
            Ok(payload) => self.deliver(payload, completed_at),
            Err(error) => self.back_off(error, completed_at),
        }
    }

    async fn fetch(&self) -> FetchResult {
        let request = self.fetcher.fetch(&self.key);
        match self.fetch_timeout {
            Some(limit) => tokio::time::timeout(limit, request)
                .await
                .unwrap_or_else(|_| Err(FetchError::Timeout(limit))),
            None => request.await,
        }
    }

    fn deliver(&self, payload: Value, completed_at: Instant) -> Step {
        let delivery = {
            let mut shared = lock(&self.shared);
            shared.retry_count = 0;
            shared.last_fetched_at = Some(completed_at);

            if ChangeDetector::has_changed(shared.last_payload.as_deref(), &payload) {
                shared.state = LoopState::Delivering;
                shared.delivery_count += 1;
                let payload = Arc::new(payload);
                shared.last_payload = Some(Arc::clone(&payload));
                let frame = FeedFrame {
                    key: self.key.clone(),
                    payload,
                    fetched_at: completed_at,
                    sequence: shared.delivery_count,
                };
                Some((frame, shared.dispatcher.fanout()))
            } else {
                None
            }
        };

        match delivery {
            Some((frame, fanout)) => {
                log::debug!("Delivering update #{} for feed '{}'.", frame.sequence, self.key);
                fanout.update(&frame);
            }
            None => log::trace!("Feed '{}' unchanged; nothing delivered.", self.key),
        }
        Step::Wait(Timer::Interval { since: completed_at })
    }

    fn back_off(&self, error: FetchError, completed_at: Instant) -> Step {
        let (attempt, fanout) = {
            let mut shared = lock(&self.shared);
            shared.state = LoopState::Backoff;
            shared.retry_count += 1;
            (shared.retry_count, shared.dispatcher.fanout())
        };

        if self.policy.is_exhausted(attempt) {
            // Mark disposed before notifying so a subscriber reacting to the
            // terminal error gets a fresh loop instead of this one.
            self.set_state(LoopState::Disposed);
            log::error!(
                "Feed '{}' failed {} consecutive times (budget {}); disposing: {}",
                self.key,
                attempt,
                self.policy.max_retries(),
                error
            );
            fanout.error(&FeedError::RetriesExceeded {
                key: self.key.clone(),
                attempts: attempt,
                last: error,
            });
            return Step::Dispose;
        }

        let delay = self.policy.next_delay(attempt - 1);
        log::warn!(
            "Fetch {} for feed '{}' failed: {}. Retrying in {:?}.",
            attempt,
            self.key,
            error,
            delay
        );
        fanout.error(&FeedError::Fetch {
            key: self.key.clone(),
            attempt,
            retry_in: delay,
            source: error,
        });
        Step::Wait(Timer::Fixed(completed_at + delay))
    }

    async fn wait(&mut self, timer: Timer) -> Step {
        if self.cancel.is_cancelled() {
            return Step::Stop;
        }
        if self.observer.is_hidden() {
            return Step::Pause;
        }
        self.set_state(LoopState::Scheduled);

        loop {
            let deadline = match timer {
                Timer::Interval { since } => since + self.effective_interval(),
                Timer::Fixed(at) => at,
            };
            tokio::select! {
                _ = self.cancel.cancelled() => return Step::Stop,
                _ = sleep_until(deadline) => return Step::Fetch,
                _ = self.reschedule.notified() => continue,
                visibility = self.observer.changed() => {
                    if visibility == Visibility::Hidden {
                        return Step::Pause;
                    }
                }
            }
        }
    }

    async fn pause(&mut self) -> Step {
        self.set_state(LoopState::Paused);
        log::debug!("Feed '{}' paused while hidden.", self.key);

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => return Step::Stop,
                visibility = self.observer.changed() => {
                    if visibility == Visibility::Visible {
                        log::debug!(
                            "Feed '{}' resuming in {:?}.",
                            self.key,
                            self.quick_restart
                        );
                        return Step::Wait(Timer::Fixed(Instant::now() + self.quick_restart));
                    }
                }
            }
        }
    }

    fn effective_interval(&self) -> Duration {
        lock(&self.shared)
            .dispatcher
            .effective_interval()
            .unwrap_or(self.fallback_interval)
    }

    fn set_state(&self, state: LoopState) {
        lock(&self.shared).state = state;
    }
}
