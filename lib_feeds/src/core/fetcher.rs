//! # Fetch Capability
//!
//! The engine never talks HTTP itself. Whatever serves feed data is plugged in
//! as a [`FeedFetcher`]: given a key, produce a JSON document or a
//! [`FetchError`]. Plain async closures implement the trait, which keeps tests
//! and alternative hosts free of any transport code.

use std::future::Future;

use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use serde_json::Value;

use crate::core::error::FetchError;
use crate::core::key::FeedKey;

/// Result of one fetch.
pub type FetchResult = Result<Value, FetchError>;

/// Asynchronous source of feed payloads.
pub trait FeedFetcher: Send + Sync {
    /// Fetches the current payload for `key`.
    fn fetch(&self, key: &FeedKey) -> BoxFuture<'static, FetchResult>;
}

impl<F, Fut> FeedFetcher for F
where
    F: Fn(&FeedKey) -> Fut + Send + Sync,
    Fut: Future<Output = FetchResult> + Send + 'static,
{
    fn fetch(&self, key: &FeedKey) -> BoxFuture<'static, FetchResult> {
        (self)(key).boxed()
    }
}
