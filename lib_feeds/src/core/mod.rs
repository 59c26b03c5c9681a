//! # Core Engine Module
//!
//! The feed synchronization engine. It keeps any number of independent feeds
//! fresh by polling, suppresses unchanged payloads, backs off on failure, and
//! suspends while the host is not visible.
//!
//! ## Core Components:
//!
//! - **`registry`**: the subscription manager. Reference-counts subscribers per
//!   feed key, creates a poll loop for the first one and disposes it when the
//!   last one leaves.
//!
//! - **`poll_loop`**: the per-feed state machine (`Idle`, `Scheduled`,
//!   `Fetching`, `Delivering`, `Backoff`, `Paused`, `Disposed`) that owns the
//!   only in-flight fetch of its feed.
//!
//! - **`dispatcher`**: zero-copy fan-out of changed payloads and errors to the
//!   subscribers of one feed.
//!
//! - **`backoff`** and **`change`**: the pure retry-delay and change-detection
//!   policies applied by every loop.
//!
//! - **`visibility`**: the process-wide visible/hidden switch that pauses and
//!   resumes every loop at once.

/// Exponential retry delays with a hard ceiling.
pub mod backoff;
/// Structural comparison of consecutive payloads.
pub mod change;
/// Zero-copy fan-out to the subscribers of one feed.
pub mod dispatcher;
/// Fetch and subscription errors.
pub mod error;
/// The pluggable fetch capability.
pub mod fetcher;
/// Feed identities.
pub mod key;
/// The per-feed polling state machine.
pub mod poll_loop;
/// Subscription management keyed by feed.
pub mod registry;
/// Host visibility broadcasting.
pub mod visibility;

// --- Public API Re-exports ---
pub use backoff::{BackoffPolicy, MAX_DELAY_CAP};
pub use change::ChangeDetector;
pub use dispatcher::{ErrorCallback, FeedFrame, UpdateCallback};
pub use error::{FeedError, FetchError};
pub use fetcher::{FeedFetcher, FetchResult};
pub use key::FeedKey;
pub use poll_loop::{FeedSnapshot, LoopState};
pub use registry::{
    FeedRegistry, SubscribeOptions, SubscriptionHandle, DEFAULT_BACKOFF_MULTIPLIER,
    DEFAULT_MAX_RETRIES,
};
pub use visibility::{Visibility, VisibilityController, VisibilityObserver};
