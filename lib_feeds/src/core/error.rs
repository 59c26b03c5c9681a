//! # Feed Errors
//!
//! Two layers of errors flow through the engine:
//!
//! - [`FetchError`] is what the fetch capability reports for a single request.
//! - [`FeedError`] is what subscribers see. Subscription misuse is returned
//!   synchronously from `subscribe`; fetch failures are handed to every
//!   subscriber's `on_error`, either as a transient [`FeedError::Fetch`] or as
//!   the terminal [`FeedError::RetriesExceeded`].

use std::time::Duration;
use thiserror::Error;

use crate::core::key::FeedKey;

/// A single failed fetch.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum FetchError {
    /// Transport-level failure (DNS, connect, reset, ...).
    #[error("network error: {0}")]
    Network(String),

    /// The endpoint answered with a non-success status.
    #[error("unexpected HTTP status {status}: {body}")]
    Status {
        /// Numeric HTTP status code.
        status: u16,
        /// Response body, possibly empty.
        body: String,
    },

    /// The response could not be decoded as JSON.
    #[error("malformed payload: {0}")]
    Malformed(String),

    /// The fetch did not complete in time.
    #[error("fetch timed out after {0:?}")]
    Timeout(Duration),
}

/// Errors reported by the registry and its poll loops.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum FeedError {
    /// The key is empty or has a blank part.
    #[error("invalid feed key '{0}'")]
    InvalidKey(FeedKey),

    /// Intervals must be strictly positive.
    #[error("invalid interval for feed '{0}': must be greater than zero")]
    InvalidInterval(FeedKey),

    /// Retry options are out of range.
    #[error("invalid options for feed '{key}': {reason}")]
    InvalidOptions {
        /// Feed the options were meant for.
        key: FeedKey,
        /// What was wrong.
        reason: String,
    },

    /// A fetch failed; the loop will retry after `retry_in`.
    #[error("fetch {attempt} for feed '{key}' failed, retrying in {retry_in:?}: {source}")]
    Fetch {
        /// Feed that failed.
        key: FeedKey,
        /// Consecutive failures so far, starting at 1.
        attempt: u32,
        /// Delay before the next attempt.
        retry_in: Duration,
        /// Underlying failure.
        #[source]
        source: FetchError,
    },

    /// The retry budget is exhausted and the loop has been disposed.
    #[error("retries exceeded for feed '{key}' after {attempts} consecutive failures: {last}")]
    RetriesExceeded {
        /// Feed that was disposed.
        key: FeedKey,
        /// Consecutive failures including the last one.
        attempts: u32,
        /// The final failure.
        last: FetchError,
    },
}

impl FeedError {
    /// `true` when the feed has stopped and will not poll again until a fresh
    /// subscription recreates it.
    pub fn is_terminal(&self) -> bool {
        matches!(self, FeedError::RetriesExceeded { .. })
    }

    /// The feed this error belongs to.
    pub fn key(&self) -> &FeedKey {
        match self {
            FeedError::InvalidKey(key) | FeedError::InvalidInterval(key) => key,
            FeedError::InvalidOptions { key, .. }
            | FeedError::Fetch { key, .. }
            | FeedError::RetriesExceeded { key, .. } => key,
        }
    }
}
