//! # Subscriber Fan-out
//!
//! Every poll loop owns one [`Dispatcher`]: the set of subscribers attached to
//! its feed, each with an `on_update`/`on_error` pair and a desired interval.
//!
//! ## Core Design Principles:
//!
//! 1.  **Zero-Copy Fan-out**: a delivered payload is wrapped once in an `Arc`
//!     inside a [`FeedFrame`]; every subscriber receives a reference to the same
//!     frame.
//!
//! 2.  **Callbacks run outside the lock**: the loop takes a [`Fanout`] snapshot
//!     of the callbacks while holding its state lock and invokes them after
//!     releasing it, so a callback may safely subscribe or unsubscribe.
//!     A panicking callback is caught and logged; the loop and the other
//!     subscribers keep running.
//!
//! 3.  **Effective interval**: the shared loop polls as often as its most
//!     demanding subscriber, i.e. at the minimum of all attached intervals.

use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::time::Instant;

use crate::core::error::FeedError;
use crate::core::key::FeedKey;

/// Callback invoked with each changed payload.
pub type UpdateCallback = Arc<dyn Fn(&FeedFrame) + Send + Sync>;
/// Callback invoked with each fetch failure, transient or terminal.
pub type ErrorCallback = Arc<dyn Fn(&FeedError) + Send + Sync>;

/// # Feed Frame
///
/// One delivery of a changed payload.
#[derive(Debug, Clone)]
pub struct FeedFrame {
    /// Feed the payload belongs to.
    pub key: FeedKey,
    /// The payload, shared between all subscribers.
    pub payload: Arc<Value>,
    /// When the fetch that produced this payload completed.
    pub fetched_at: Instant,
    /// Per-feed delivery counter, starting at 1.
    pub sequence: u64,
}

struct SubscriberHandle {
    id: u64,
    interval: Duration,
    on_update: UpdateCallback,
    on_error: ErrorCallback,
}

/// The subscribers attached to one feed.
#[derive(Default)]
pub(crate) struct Dispatcher {
    subscribers: Vec<SubscriberHandle>,
}

/// Callbacks captured for one broadcast.
pub(crate) struct Fanout {
    updates: Vec<UpdateCallback>,
    errors: Vec<ErrorCallback>,
}

impl Dispatcher {
    pub(crate) fn add(
        &mut self,
        id: u64,
        interval: Duration,
        on_update: UpdateCallback,
        on_error: ErrorCallback,
    ) {
        self.subscribers.push(SubscriberHandle {
            id,
            interval,
            on_update,
            on_error,
        });
    }

    /// Removes subscriber `id`. Returns `false` if it was not attached.
    pub(crate) fn remove(&mut self, id: u64) -> bool {
        let before = self.subscribers.len();
        self.subscribers.retain(|s| s.id != id);
        self.subscribers.len() != before
    }

    pub(crate) fn len(&self) -> usize {
        self.subscribers.len()
    }

    /// Minimum interval over all subscribers, `None` when nobody is attached.
    pub(crate) fn effective_interval(&self) -> Option<Duration> {
        self.subscribers.iter().map(|s| s.interval).min()
    }

    pub(crate) fn fanout(&self) -> Fanout {
        Fanout {
            updates: self.subscribers.iter().map(|s| Arc::clone(&s.on_update)).collect(),
            errors: self.subscribers.iter().map(|s| Arc::clone(&s.on_error)).collect(),
        }
    }
}

impl Fanout {
    pub(crate) fn update(&self, frame: &FeedFrame) {
        for on_update in &self.updates {
            if let Err(panic) = catch_unwind(AssertUnwindSafe(|| on_update(frame))) {
                log::error!(
                    "Update callback for feed '{}' panicked: {}",
                    frame.key,
                    panic_message(&*panic)
                );
            }
        }
    }

    pub(crate) fn error(&self, error: &FeedError) {
        for on_error in &self.errors {
            if let Err(panic) = catch_unwind(AssertUnwindSafe(|| on_error(error))) {
                log::error!(
                    "Error callback for feed '{}' panicked: {}",
                    error.key(),
                    panic_message(&*panic)
                );
            }
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    panic
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| panic.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("non-string panic payload")
}
