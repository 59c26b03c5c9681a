//! # HTTP Retrieval Utilities
//!
//! An asynchronous API client wrapper around `reqwest` and the HTTP
//! implementation of [`FeedFetcher`]. The client performs exactly one request
//! per call: retries and backoff belong to the poll loop, which needs to count
//! every failed attempt itself.

use std::collections::HashMap;
use std::time::Duration;

use futures_util::future::{BoxFuture, FutureExt};
use reqwest::{header::AUTHORIZATION, Url};
use serde_json::Value;
use thiserror::Error;

use crate::core::{FeedFetcher, FeedKey, FetchError, FetchResult};

/// Errors building an [`ApiClient`].
#[derive(Error, Debug)]
pub enum ClientError {
    /// The base URL is not an absolute URL.
    #[error("Invalid base URL '{url}': {source}")]
    InvalidBaseUrl {
        /// The rejected input.
        url: String,
        /// Parser error.
        #[source]
        source: url::ParseError,
    },
    /// The underlying HTTP client could not be built.
    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),
}

/// A flexible asynchronous HTTP client.
///
/// Handles the base URL, the bearer token and the per-request timeout.
#[derive(Debug, Clone)]
pub struct ApiClient {
    inner: reqwest::Client,
    base_url: Url,
    auth_token: Option<String>,
}

impl ApiClient {
    /// Creates a new `ApiClient`.
    ///
    /// # Arguments
    /// * `base_url` - The absolute base URL for the API (e.g., "https://api.example.com/v1/").
    /// * `auth_token` - An optional string for the Authorization header.
    /// * `timeout` - An optional per-request timeout.
    pub fn new(
        base_url: &str,
        auth_token: Option<String>,
        timeout: Option<Duration>,
    ) -> Result<Self, ClientError> {
        let base_url = Url::parse(base_url).map_err(|source| ClientError::InvalidBaseUrl {
            url: base_url.to_string(),
            source,
        })?;

        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }

        Ok(Self {
            inner: builder.build()?,
            base_url,
            auth_token,
        })
    }

    /// The base URL all paths are joined to.
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// GETs `path` and returns its JSON body, mapping every failure onto
    /// [`FetchError`].
    pub async fn get_json(&self, path: &str) -> FetchResult {
        let url = self
            .base_url
            .join(path)
            .map_err(|e| FetchError::Network(format!("cannot join '{path}': {e}")))?;
        let mut req = self.inner.get(url);
        if let Some(token) = &self.auth_token {
            req = req.header(AUTHORIZATION, format!("Bearer {}", token));
        }

        let response = req.send().await.map_err(map_transport)?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(FetchError::Status {
                status: status.as_u16(),
                body,
            });
        }
        let bytes = response.bytes().await.map_err(map_transport)?;
        serde_json::from_slice::<Value>(&bytes).map_err(|e| FetchError::Malformed(e.to_string()))
    }
}

fn map_transport(error: reqwest::Error) -> FetchError {
    FetchError::Network(error.to_string())
}

/// # HTTP Feed Fetcher
///
/// Resolves a [`FeedKey`] to a path relative to the client's base URL and GETs
/// it. By default the path is the key's parts joined with `/`; individual keys
/// can be routed elsewhere.
#[derive(Debug, Clone)]
pub struct HttpFeedFetcher {
    client: ApiClient,
    routes: HashMap<FeedKey, String>,
}

impl HttpFeedFetcher {
    /// A fetcher with default routing.
    pub fn new(client: ApiClient) -> Self {
        Self {
            client,
            routes: HashMap::new(),
        }
    }

    /// Routes `key` to `path` instead of its default path.
    pub fn route(mut self, key: impl Into<FeedKey>, path: impl Into<String>) -> Self {
        self.routes.insert(key.into(), path.into());
        self
    }

    /// The path `key` is fetched from.
    pub fn path_for(&self, key: &FeedKey) -> String {
        self.routes
            .get(key)
            .cloned()
            .unwrap_or_else(|| key.to_path())
    }
}

impl FeedFetcher for HttpFeedFetcher {
    fn fetch(&self, key: &FeedKey) -> BoxFuture<'static, FetchResult> {
        let client = self.client.clone();
        let path = self.path_for(key);
        async move {
            log::trace!("GET {}", path);
            client.get_json(&path).await
        }
        .boxed()
    }
}
