//! Headless browser fetcher for endpoints that reject plain HTTP clients.
//!
//! Uses chromiumoxide (CDP). One browser process is shared by the fetcher;
//! each attempt runs in its own incognito browser context with a freshly
//! drawn user agent, and the context is disposed when the attempt ends.

#[cfg(feature = "browser")]
use std::sync::Arc;
#[cfg(feature = "browser")]
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
#[cfg(feature = "browser")]
use tracing::{debug, info, warn};

#[cfg(feature = "browser")]
use chromiumoxide::cdp::browser_protocol::network::SetUserAgentOverrideParams;
#[cfg(feature = "browser")]
use chromiumoxide::cdp::browser_protocol::page::NavigateParams;
#[cfg(feature = "browser")]
use chromiumoxide::cdp::browser_protocol::browser::BrowserContextId;
#[cfg(feature = "browser")]
use chromiumoxide::cdp::browser_protocol::target::{
    CreateBrowserContextParams, CreateTargetParams, DisposeBrowserContextParams,
};
#[cfg(feature = "browser")]
use chromiumoxide::{Browser, BrowserConfig, Page};
#[cfg(feature = "browser")]
use futures::StreamExt;
#[cfg(feature = "browser")]
use tokio::sync::OnceCell;

#[cfg(feature = "browser")]
use super::http_client::random_user_agent;
#[cfg(feature = "browser")]
use super::{check_json_content_type, AttemptError};
use super::retry::RetryPolicy;
use super::{FetchError, Fetcher};
#[cfg(feature = "browser")]
use crate::utils::prettify;

/// Browser engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrowserEngineConfig {
    /// Run in headless mode (default: true).
    #[serde(default = "default_headless")]
    pub headless: bool,

    /// Proxy server URL (e.g., "socks5://127.0.0.1:1080").
    #[serde(default)]
    pub proxy: Option<String>,

    /// Additional Chrome arguments.
    #[serde(default)]
    pub chrome_args: Vec<String>,

    /// Remote Chrome DevTools URL (e.g., "ws://localhost:9222").
    /// If set, connects to existing browser instead of launching one.
    #[serde(default)]
    pub remote_url: Option<String>,

    /// Quiet period with no new network activity that counts as idle, in milliseconds.
    #[serde(default = "default_idle_ms")]
    pub network_idle_ms: u64,

    /// Ignore TLS certificate errors inside the browser.
    #[serde(default)]
    pub ignore_https_errors: bool,
}

fn default_headless() -> bool {
    true
}

fn default_idle_ms() -> u64 {
    500
}

impl Default for BrowserEngineConfig {
    fn default() -> Self {
        Self {
            headless: default_headless(),
            proxy: None,
            chrome_args: Vec::new(),
            remote_url: None,
            network_idle_ms: default_idle_ms(),
            ignore_https_errors: false,
        }
    }
}

/// Browser-based fetcher.
pub struct BrowserFetcher {
    config: BrowserEngineConfig,
    policy: RetryPolicy,
    #[cfg(feature = "browser")]
    browser: OnceCell<Arc<Browser>>,
}

impl BrowserFetcher {
    pub fn new(config: BrowserEngineConfig, policy: RetryPolicy) -> Self {
        Self {
            config,
            policy,
            #[cfg(feature = "browser")]
            browser: OnceCell::new(),
        }
    }

    pub fn config(&self) -> &BrowserEngineConfig {
        &self.config
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }
}

#[cfg(not(feature = "browser"))]
#[async_trait]
impl Fetcher for BrowserFetcher {
    async fn fetch_json(&self, _url: &str) -> Result<serde_json::Value, FetchError> {
        Err(FetchError::Unsupported("browser"))
    }

    async fn fetch_html(&self, _url: &str) -> Result<String, FetchError> {
        Err(FetchError::Unsupported("browser"))
    }

    fn name(&self) -> &'static str {
        "browser"
    }
}

#[cfg(feature = "browser")]
#[async_trait]
impl Fetcher for BrowserFetcher {
    async fn fetch_json(&self, url: &str) -> Result<serde_json::Value, FetchError> {
        let browser = self.browser().await?;
        self.policy
            .run(url, |_| {
                let browser = browser.clone();
                async move {
                    let session = BrowserSession::open(browser).await?;
                    let result = session.render_text(url, &self.config).await;
                    session.close().await;
                    let (content_type, text) = result?;
                    check_json_content_type(url, &content_type);
                    serde_json::from_str(text.trim()).map_err(|e| AttemptError::Body(e.to_string()))
                }
            })
            .await
    }

    async fn fetch_html(&self, url: &str) -> Result<String, FetchError> {
        let browser = self.browser().await?;
        self.policy
            .run(url, |_| {
                let browser = browser.clone();
                async move {
                    let session = BrowserSession::open(browser).await?;
                    let result = session.render_html(url, &self.config).await;
                    session.close().await;
                    result.map(|html| prettify(&html))
                }
            })
            .await
    }

    fn name(&self) -> &'static str {
        "browser"
    }
}

#[cfg(feature = "browser")]
impl BrowserFetcher {
    /// Common Chrome executable paths to check.
    const CHROME_PATHS: &'static [&'static str] = &[
        "/usr/bin/google-chrome",
        "/usr/bin/google-chrome-stable",
        "/usr/bin/chromium",
        "/usr/bin/chromium-browser",
        "/snap/bin/chromium",
        "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
        "/Applications/Chromium.app/Contents/MacOS/Chromium",
        "/opt/google/chrome/google-chrome",
    ];

    /// Launch or connect on first use; later calls reuse the same browser.
    async fn browser(&self) -> Result<Arc<Browser>, FetchError> {
        self.browser
            .get_or_try_init(|| async {
                let browser = match self.config.remote_url.as_deref() {
                    Some(remote_url) => connect_remote(remote_url).await?,
                    None => self.launch().await?,
                };
                Ok::<_, FetchError>(Arc::new(browser))
            })
            .await
            .cloned()
    }

    fn find_chrome() -> Option<std::path::PathBuf> {
        Self::CHROME_PATHS
            .iter()
            .map(std::path::Path::new)
            .find(|p| p.exists())
            .map(|p| p.to_path_buf())
    }

    async fn launch(&self) -> Result<Browser, FetchError> {
        info!("Launching browser (headless={})", self.config.headless);

        let mut builder = BrowserConfig::builder();
        if let Some(path) = Self::find_chrome() {
            info!("Found Chrome at: {}", path.display());
            builder = builder.chrome_executable(path);
        }

        // with_head means NOT headless
        if !self.config.headless {
            builder = builder.with_head();
        }
        if let Some(ref proxy) = self.config.proxy {
            builder = builder.arg(format!("--proxy-server={}", proxy));
        }
        if self.config.ignore_https_errors {
            builder = builder.arg("--ignore-certificate-errors");
        }

        builder = builder
            .arg("--disable-blink-features=AutomationControlled")
            .arg("--disable-dev-shm-usage")
            .arg("--no-first-run")
            .arg("--no-default-browser-check")
            .arg("--no-sandbox")
            .arg("--disable-gpu");

        for arg in &self.config.chrome_args {
            builder = builder.arg(arg);
        }

        let config = builder.build().map_err(FetchError::Setup)?;
        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| FetchError::Setup(format!("Failed to launch browser: {}", e)))?;

        tokio::spawn(async move {
            while let Some(h) = handler.next().await {
                if h.is_err() {
                    break;
                }
            }
        });

        Ok(browser)
    }
}

/// Connect to a remote Chrome instance via its DevTools endpoint.
#[cfg(feature = "browser")]
async fn connect_remote(url: &str) -> Result<Browser, FetchError> {
    info!("Connecting to remote browser at {}", url);

    let http_url = url
        .replace("ws://", "http://")
        .replace("wss://", "https://");
    let version_url = format!("{}/json/version", http_url.trim_end_matches('/'));

    let resp: serde_json::Value = reqwest::Client::new()
        .get(&version_url)
        .send()
        .await
        .map_err(|e| FetchError::Setup(format!("Failed to reach remote browser: {}", e)))?
        .json()
        .await
        .map_err(|e| FetchError::Setup(format!("Failed to parse browser version info: {}", e)))?;

    let ws_url = resp
        .get("webSocketDebuggerUrl")
        .and_then(|v| v.as_str())
        .ok_or_else(|| FetchError::Setup("No webSocketDebuggerUrl in response".to_string()))?;

    let (browser, mut handler) = Browser::connect(ws_url)
        .await
        .map_err(|e| FetchError::Setup(format!("Failed to connect to remote browser: {}", e)))?;

    tokio::spawn(async move {
        while let Some(h) = handler.next().await {
            if h.is_err() {
                break;
            }
        }
    });

    Ok(browser)
}

#[cfg(feature = "browser")]
fn browser_error(e: impl std::fmt::Display) -> AttemptError {
    AttemptError::Browser(e.to_string())
}

/// One isolated browser context plus its page, scoped to a single attempt.
///
/// Call `close()` on every normal exit. If the attempt future is dropped
/// first (timeout, cancellation), `Drop` schedules the same cleanup on the
/// runtime.
#[cfg(feature = "browser")]
struct BrowserSession {
    browser: Arc<Browser>,
    context_id: Option<BrowserContextId>,
    page: Option<Page>,
}

#[cfg(feature = "browser")]
impl BrowserSession {
    async fn open(browser: Arc<Browser>) -> Result<Self, AttemptError> {
        let created = browser
            .execute(CreateBrowserContextParams::default())
            .await
            .map_err(browser_error)?;
        let context_id = created.result.browser_context_id.clone();

        // From here on the guard owns the context, so any early return disposes it.
        let mut session = Self {
            browser,
            context_id: Some(context_id.clone()),
            page: None,
        };

        let target = CreateTargetParams::builder()
            .url("about:blank")
            .browser_context_id(context_id)
            .build()
            .map_err(AttemptError::Browser)?;
        let page = session.browser.new_page(target).await.map_err(browser_error)?;

        let user_agent = random_user_agent();
        debug!("Browser session using user agent {}", user_agent);
        page.execute(SetUserAgentOverrideParams::new(user_agent.to_string()))
            .await
            .map_err(browser_error)?;

        session.page = Some(page);
        Ok(session)
    }

    fn page(&self) -> Result<&Page, AttemptError> {
        self.page
            .as_ref()
            .ok_or_else(|| AttemptError::Browser("session has no page".to_string()))
    }

    async fn navigate(&self, url: &str, config: &BrowserEngineConfig) -> Result<&Page, AttemptError> {
        let page = self.page()?;
        info!("Navigating to {}", url);
        let nav_params = NavigateParams::builder()
            .url(url)
            .build()
            .map_err(AttemptError::Browser)?;
        page.goto(nav_params).await.map_err(browser_error)?;
        wait_for_network_idle(page, Duration::from_millis(config.network_idle_ms)).await;
        Ok(page)
    }

    /// Document MIME type and rendered body text. The text is the raw
    /// payload for JSON responses.
    async fn render_text(
        &self,
        url: &str,
        config: &BrowserEngineConfig,
    ) -> Result<(String, String), AttemptError> {
        let page = self.navigate(url, config).await?;
        page.evaluate(
            "[document.contentType || '', document.body ? document.body.innerText : '']"
                .to_string(),
        )
        .await
        .map_err(browser_error)?
        .into_value::<(String, String)>()
        .map_err(|e| AttemptError::Body(e.to_string()))
    }

    async fn render_html(&self, url: &str, config: &BrowserEngineConfig) -> Result<String, AttemptError> {
        let page = self.navigate(url, config).await?;
        page.content().await.map_err(browser_error)
    }

    /// Close the page and dispose the context.
    async fn close(mut self) {
        let page = self.page.take();
        let context_id = self.context_id.take();
        release(self.browser.clone(), page, context_id).await;
    }
}

#[cfg(feature = "browser")]
impl Drop for BrowserSession {
    fn drop(&mut self) {
        let page = self.page.take();
        let context_id = self.context_id.take();
        if page.is_none() && context_id.is_none() {
            return;
        }
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let browser = self.browser.clone();
                handle.spawn(release(browser, page, context_id));
            }
            Err(_) => warn!("Browser session dropped outside a runtime; context leaked"),
        }
    }
}

#[cfg(feature = "browser")]
async fn release(browser: Arc<Browser>, page: Option<Page>, context_id: Option<BrowserContextId>) {
    if let Some(page) = page {
        if let Err(e) = page.close().await {
            debug!("Failed to close page: {}", e);
        }
    }
    if let Some(id) = context_id {
        if let Err(e) = browser.execute(DisposeBrowserContextParams::new(id)).await {
            debug!("Failed to dispose browser context: {}", e);
        }
    }
}

/// Wait until the page has finished loading and no new resources have
/// started for `quiet`. Gives up silently after 30 s.
#[cfg(feature = "browser")]
async fn wait_for_network_idle(page: &Page, quiet: Duration) {
    const POLL: Duration = Duration::from_millis(100);
    const LIMIT: Duration = Duration::from_secs(30);
    const LOAD_STATE: &str =
        "[document.readyState, performance.getEntriesByType('resource').length]";

    let started = tokio::time::Instant::now();
    let mut last_count = None;
    let mut quiet_since = tokio::time::Instant::now();

    while started.elapsed() < LIMIT {
        let state = match page.evaluate(LOAD_STATE.to_string()).await {
            Ok(result) => result.into_value::<(String, u64)>().ok(),
            Err(e) => {
                debug!("Network idle check failed: {}", e);
                None
            }
        };

        if let Some((ready_state, count)) = state {
            if last_count != Some(count) {
                last_count = Some(count);
                quiet_since = tokio::time::Instant::now();
            } else if ready_state == "complete" && quiet_since.elapsed() >= quiet {
                return;
            }
        }

        tokio::time::sleep(POLL).await;
    }

    warn!("Timed out waiting for network idle");
}
