//! Fetch layer for the procurement search API.
//!
//! Two `Fetcher` strategies share one retry contract: a plain HTTP client
//! and a headless browser for endpoints that refuse non-browser clients.

pub mod browser;
pub mod gate;
pub mod http_client;
pub mod pagination;
pub mod retry;

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::Settings;

pub use browser::{BrowserEngineConfig, BrowserFetcher};
pub use gate::{ConcurrencyGate, GatePermit};
pub use http_client::{HttpFetcher, IMPERSONATE_USER_AGENTS};
pub use pagination::{Paginator, SearchQuery, StopReason};
pub use retry::RetryPolicy;

/// Failure of a single fetch attempt. Every variant is retryable.
#[derive(Debug, Error)]
pub enum AttemptError {
    #[error("Timed out after {0:?}")]
    Timeout(Duration),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("HTTP status {0}")]
    Status(u16),

    #[error("Malformed body: {0}")]
    Body(String),

    #[error("Browser error: {0}")]
    Browser(String),
}

impl From<reqwest::Error> for AttemptError {
    fn from(e: reqwest::Error) -> Self {
        if let Some(status) = e.status() {
            return AttemptError::Status(status.as_u16());
        }
        if e.is_decode() || e.is_body() {
            return AttemptError::Body(e.to_string());
        }
        AttemptError::Transport(e.to_string())
    }
}

/// Terminal fetch failure returned to callers.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("Gave up on {url} after {attempts} attempts: {last_error}")]
    Exhausted {
        url: String,
        attempts: u32,
        #[source]
        last_error: AttemptError,
    },

    #[error("{0} fetching is not available in this build")]
    Unsupported(&'static str),

    #[error("Fetcher setup failed: {0}")]
    Setup(String),
}

/// Capability to retrieve a URL as JSON or rendered HTML.
///
/// Implementations apply their own retry policy; a returned error means
/// every attempt failed.
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Fetch and parse a JSON document.
    async fn fetch_json(&self, url: &str) -> Result<serde_json::Value, FetchError>;

    /// Fetch a page and return prettified markup.
    async fn fetch_html(&self, url: &str) -> Result<String, FetchError>;

    /// Short name used in logs.
    fn name(&self) -> &'static str;
}

/// Which fetch strategy to use.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FetchEngine {
    #[default]
    Http,
    Browser,
}

impl FetchEngine {
    pub fn as_str(&self) -> &'static str {
        match self {
            FetchEngine::Http => "http",
            FetchEngine::Browser => "browser",
        }
    }
}

impl FromStr for FetchEngine {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "http" => Ok(FetchEngine::Http),
            "browser" => Ok(FetchEngine::Browser),
            other => Err(format!("unknown engine '{}' (expected http or browser)", other)),
        }
    }
}

impl std::fmt::Display for FetchEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Log a content-type mismatch on a JSON request. The body is still parsed.
///
/// Returns whether the content type looked like JSON.
pub(crate) fn check_json_content_type(url: &str, content_type: &str) -> bool {
    let is_json = content_type.to_ascii_lowercase().contains("json");
    if !is_json {
        tracing::warn!(
            "Expected JSON from {} but got content type '{}'",
            url, content_type
        );
    }
    is_json
}

/// Build the configured fetcher.
pub fn build_fetcher(settings: &Settings) -> Arc<dyn Fetcher> {
    let policy = settings.retry_policy();
    match settings.engine {
        FetchEngine::Http => Arc::new(
            HttpFetcher::new(policy)
                .with_user_agent(settings.user_agent.as_deref())
                .accept_invalid_certs(settings.accept_invalid_certs),
        ),
        FetchEngine::Browser => Arc::new(BrowserFetcher::new(settings.browser.clone(), policy)),
    }
}
