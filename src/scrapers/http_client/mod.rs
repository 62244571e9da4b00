//! Plain HTTP fetcher built on reqwest.
//!
//! Every attempt gets its own `Client` (and therefore its own cookie jar and
//! connection pool). Nothing survives from one attempt to the next, so a
//! poisoned session cannot leak into the retry.

mod user_agent;

pub use user_agent::{random_user_agent, resolve_user_agent, IMPERSONATE_USER_AGENTS, USER_AGENT};

use async_trait::async_trait;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::redirect::Policy;
use reqwest::Client;
use tracing::debug;

use super::retry::RetryPolicy;
use super::{check_json_content_type, AttemptError, FetchError, Fetcher};
use crate::utils::prettify;

/// Maximum redirects followed per request.
const MAX_REDIRECTS: usize = 10;

/// Body and content type of a successful response.
struct RawResponse {
    content_type: String,
    body: String,
}

/// HTTP fetcher with per-attempt clients.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    policy: RetryPolicy,
    user_agent: Option<String>,
    accept_invalid_certs: bool,
}

impl HttpFetcher {
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            user_agent: None,
            accept_invalid_certs: false,
        }
    }

    /// Set user agent configuration.
    /// - None: default tenderscout user agent
    /// - Some("impersonate"): random real browser user agent, re-drawn per attempt
    /// - Some(custom): custom user agent string
    pub fn with_user_agent(mut self, user_agent: Option<&str>) -> Self {
        self.user_agent = user_agent.map(str::to_string);
        self
    }

    /// Skip TLS certificate verification.
    pub fn accept_invalid_certs(mut self, accept: bool) -> Self {
        self.accept_invalid_certs = accept;
        self
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    fn build_client(&self) -> Result<Client, AttemptError> {
        Client::builder()
            .user_agent(resolve_user_agent(self.user_agent.as_deref()))
            .cookie_store(true)
            .gzip(true)
            .brotli(true)
            .redirect(Policy::limited(MAX_REDIRECTS))
            .danger_accept_invalid_certs(self.accept_invalid_certs)
            .build()
            .map_err(|e| AttemptError::Transport(e.to_string()))
    }

    /// One GET with a fresh client. The client drops when this returns.
    async fn get_once(&self, url: &str, accept: &str) -> Result<RawResponse, AttemptError> {
        let client = self.build_client()?;
        debug!("GET {}", url);

        let response = client.get(url).header(ACCEPT, accept).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(AttemptError::Status(status.as_u16()));
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();
        let body = response.text().await?;

        Ok(RawResponse { content_type, body })
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch_json(&self, url: &str) -> Result<serde_json::Value, FetchError> {
        self.policy
            .run(url, |_| async move {
                let raw = self.get_once(url, "application/json").await?;
                check_json_content_type(url, &raw.content_type);
                serde_json::from_str(&raw.body).map_err(|e| AttemptError::Body(e.to_string()))
            })
            .await
    }

    async fn fetch_html(&self, url: &str) -> Result<String, FetchError> {
        self.policy
            .run(url, |_| async move {
                let raw = self.get_once(url, "text/html,application/xhtml+xml").await?;
                Ok(prettify(&raw.body))
            })
            .await
    }

    fn name(&self) -> &'static str {
        "http"
    }
}
