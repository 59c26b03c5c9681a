//! # Data Retrieval Module
//!
//! HTTP plumbing for feeds. The engine only knows the [`FeedFetcher`]
//! capability; this module provides the implementation that talks to a REST
//! API.
//!
//! ## Contained Modules:
//!
//! - **`ky_http`**: a generic `ApiClient` built on `reqwest` (base URL, bearer
//!   token, timeout) and `HttpFeedFetcher`, which maps feed keys to API paths.
//!
//! [`FeedFetcher`]: crate::core::FeedFetcher

/// Generic HTTP API client and the HTTP feed fetcher.
pub mod ky_http;

pub use ky_http::{ApiClient, ClientError, HttpFeedFetcher};
