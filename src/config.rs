//! Configuration management for tenderscout using the prefer crate.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::repository::diesel_context::DieselDbContext;
use crate::scrapers::gate::DEFAULT_MAX_CONCURRENT;
use crate::scrapers::pagination::{DEFAULT_API_BASE_URL, DEFAULT_PAGE_SIZE};
use crate::scrapers::{BrowserEngineConfig, ConcurrencyGate, FetchEngine, RetryPolicy};
use crate::services::normalize::{Normalizer, DEFAULT_DETAILS_BASE_URL};
use crate::services::pipeline::PipelineConfig;
use crate::services::scheduler::{ScheduleConfig, DEFAULT_INTERVAL};

/// Default database filename.
pub const DEFAULT_DATABASE_FILENAME: &str = "tenderscout.db";

/// Application settings.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Base data directory.
    pub data_dir: PathBuf,
    /// Database filename.
    pub database_filename: String,
    /// Database URL (overrides data_dir/database_filename if set).
    /// Set via DATABASE_URL env var.
    pub database_url: Option<String>,
    /// User agent for HTTP requests. None sends the tenderscout identity,
    /// "impersonate" draws a browser identity per attempt, anything else is
    /// sent as given.
    pub user_agent: Option<String>,
    /// Per-attempt timeout in seconds.
    pub request_timeout: u64,
    /// Attempts per request before giving up.
    pub max_retries: u32,
    /// Delay between page requests in milliseconds.
    pub page_delay_ms: u64,
    /// Outbound requests allowed in flight at once.
    pub max_concurrent: usize,
    /// Records of one page processed at once.
    pub record_concurrency: usize,
    pub page_size: u32,
    pub days_back: u32,
    pub max_pages: u32,
    pub engine: FetchEngine,
    pub api_base_url: String,
    pub details_base_url: String,
    /// Optional CPV classification filter.
    pub cpv_code: Option<String>,
    /// Skip TLS certificate verification for HTTP requests.
    pub accept_invalid_certs: bool,
    /// Seconds between scheduled runs in daemon mode.
    pub schedule_interval: u64,
    pub browser: BrowserEngineConfig,
}

impl Default for Settings {
    fn default() -> Self {
        // ~/Documents/tenderscout, falling back to home then CWD
        let data_dir = dirs::document_dir()
            .or_else(dirs::home_dir)
            .unwrap_or_else(|| PathBuf::from("."))
            .join("tenderscout");

        Self {
            data_dir,
            database_filename: DEFAULT_DATABASE_FILENAME.to_string(),
            database_url: None,
            user_agent: None,
            request_timeout: 60,
            max_retries: 3,
            page_delay_ms: 1000,
            max_concurrent: DEFAULT_MAX_CONCURRENT,
            record_concurrency: 4,
            page_size: DEFAULT_PAGE_SIZE,
            days_back: 7,
            max_pages: 10_000,
            engine: FetchEngine::default(),
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            details_base_url: DEFAULT_DETAILS_BASE_URL.to_string(),
            cpv_code: None,
            accept_invalid_certs: false,
            schedule_interval: DEFAULT_INTERVAL.as_secs(),
            browser: BrowserEngineConfig::default(),
        }
    }
}

impl Settings {
    /// Create settings with a custom data directory.
    pub fn with_data_dir(data_dir: PathBuf) -> Self {
        Self {
            data_dir,
            ..Default::default()
        }
    }

    /// Get the database URL, constructing from path if not explicitly set.
    pub fn database_url(&self) -> String {
        if let Some(ref url) = self.database_url {
            url.clone()
        } else {
            format!("sqlite:{}", self.database_path().display())
        }
    }

    /// Get the full path to the SQLite database file.
    pub fn database_path(&self) -> PathBuf {
        match self.database_url {
            Some(ref url) => PathBuf::from(url.strip_prefix("sqlite:").unwrap_or(url)),
            None => self.data_dir.join(&self.database_filename),
        }
    }

    /// Check if the database file has been created.
    pub fn database_exists(&self) -> bool {
        self.database_path().exists()
    }

    /// Ensure the data directory exists.
    pub fn ensure_directories(&self) -> std::io::Result<()> {
        fs::create_dir_all(&self.data_dir).map_err(|e| {
            std::io::Error::new(
                e.kind(),
                format!(
                    "Failed to create data directory '{}': {}",
                    self.data_dir.display(),
                    e
                ),
            )
        })
    }

    /// Create a database context using the configured database URL or path.
    pub fn create_db_context(&self) -> DieselDbContext {
        DieselDbContext::from_url(&self.database_url())
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.max_retries.max(1),
            Duration::from_secs(1),
            Duration::from_secs(self.request_timeout),
        )
    }

    pub fn gate(&self) -> ConcurrencyGate {
        ConcurrencyGate::new(self.max_concurrent)
    }

    pub fn normalizer(&self) -> Normalizer {
        Normalizer::new(self.details_base_url.clone())
    }

    pub fn pipeline_config(&self) -> PipelineConfig {
        PipelineConfig {
            api_base_url: self.api_base_url.clone(),
            page_size: self.page_size,
            page_delay: Duration::from_millis(self.page_delay_ms),
            record_concurrency: self.record_concurrency,
            cpv_code: self.cpv_code.clone(),
        }
    }

    pub fn schedule_config(&self) -> ScheduleConfig {
        ScheduleConfig {
            interval: Duration::from_secs(self.schedule_interval),
            days_back: self.days_back,
            max_pages: self.max_pages,
        }
    }
}

/// Configuration file structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Data directory path.
    #[serde(default, skip_serializing_if = "Option::is_none", alias = "target")]
    pub data_dir: Option<String>,
    /// Database filename.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
    /// Per-attempt timeout in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_timeout: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_retries: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_delay_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_concurrent: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub record_concurrency: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_size: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub days_back: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_pages: Option<u32>,
    /// Fetch engine: "http" or "browser".
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub engine: Option<FetchEngine>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_base_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details_base_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpv_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accept_invalid_certs: Option<bool>,
    /// Seconds between scheduled runs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schedule_interval: Option<u64>,
    /// Browser engine options.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub browser: Option<BrowserEngineConfig>,
    /// Path to the config file this was loaded from (not serialized).
    #[serde(skip)]
    pub source_path: Option<PathBuf>,
}

impl Config {
    /// Load configuration using prefer crate for discovery.
    /// Automatically discovers tenderscout config files in standard locations.
    pub async fn load() -> Self {
        match prefer::load("tenderscout").await {
            Ok(pref_config) => match pref_config.source_path() {
                Some(path) => match Self::load_from_path(path).await {
                    Ok(config) => config,
                    Err(e) => {
                        tracing::warn!("{}", e);
                        Self::default()
                    }
                },
                None => Self::default(),
            },
            // No config file found
            Err(_) => Self::default(),
        }
    }

    /// Load configuration from a specific file path.
    /// Supports JSON, TOML and YAML based on file extension.
    pub async fn load_from_path(path: &Path) -> Result<Self, String> {
        let contents = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| format!("Failed to read config file: {}", e))?;

        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("json");

        let mut config: Config = match ext {
            "toml" => toml::from_str(&contents)
                .map_err(|e| format!("Failed to parse TOML config: {}", e))?,
            "yaml" | "yml" => serde_yaml::from_str(&contents)
                .map_err(|e| format!("Failed to parse YAML config: {}", e))?,
            _ => serde_json::from_str(&contents)
                .map_err(|e| format!("Failed to parse JSON config: {}", e))?,
        };

        config.source_path = Some(path.to_path_buf());
        Ok(config)
    }

    /// Get the base directory for resolving relative paths.
    pub fn base_dir(&self) -> Option<PathBuf> {
        self.source_path
            .as_ref()
            .and_then(|p| p.parent().map(|p| p.to_path_buf()))
    }

    /// Resolve a path that may be relative to the config file.
    /// - Absolute paths are returned as-is
    /// - Paths starting with ~ are expanded
    /// - Relative paths are resolved relative to `base_dir`
    pub fn resolve_path(&self, path_str: &str, base_dir: &Path) -> PathBuf {
        let expanded = shellexpand::tilde(path_str);
        let path = Path::new(expanded.as_ref());

        if path.is_absolute() {
            path.to_path_buf()
        } else {
            base_dir.join(path)
        }
    }

    /// Apply configuration to settings.
    pub fn apply_to_settings(&self, settings: &mut Settings, base_dir: &Path) {
        if let Some(ref data_dir) = self.data_dir {
            settings.data_dir = self.resolve_path(data_dir, base_dir);
        }
        if let Some(ref database) = self.database {
            settings.database_filename = database.clone();
        }
        if let Some(ref user_agent) = self.user_agent {
            settings.user_agent = Some(user_agent.clone());
        }
        if let Some(timeout) = self.request_timeout {
            settings.request_timeout = timeout;
        }
        if let Some(retries) = self.max_retries {
            settings.max_retries = retries;
        }
        if let Some(delay) = self.page_delay_ms {
            settings.page_delay_ms = delay;
        }
        if let Some(n) = self.max_concurrent {
            settings.max_concurrent = n;
        }
        if let Some(n) = self.record_concurrency {
            settings.record_concurrency = n;
        }
        if let Some(n) = self.page_size {
            settings.page_size = n;
        }
        if let Some(n) = self.days_back {
            settings.days_back = n;
        }
        if let Some(n) = self.max_pages {
            settings.max_pages = n;
        }
        if let Some(engine) = self.engine {
            settings.engine = engine;
        }
        if let Some(ref url) = self.api_base_url {
            settings.api_base_url = url.clone();
        }
        if let Some(ref url) = self.details_base_url {
            settings.details_base_url = url.clone();
        }
        if let Some(ref cpv) = self.cpv_code {
            settings.cpv_code = Some(cpv.clone());
        }
        if let Some(accept) = self.accept_invalid_certs {
            settings.accept_invalid_certs = accept;
        }
        if let Some(interval) = self.schedule_interval {
            settings.schedule_interval = interval;
        }
        if let Some(ref browser) = self.browser {
            settings.browser = browser.clone();
        }
    }
}

/// Options for loading settings.
#[derive(Debug, Clone, Default)]
pub struct LoadOptions {
    /// Explicit config file path (overrides auto-discovery).
    pub config_path: Option<PathBuf>,
    /// Use CWD for relative paths instead of config file directory.
    pub use_cwd: bool,
    /// Data directory or database file (--target flag).
    pub data: Option<PathBuf>,
}

fn absolute(path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .unwrap_or_else(|_| PathBuf::from("."))
            .join(path)
    }
}

fn is_db_file(path: &Path) -> bool {
    path.extension()
        .is_some_and(|ext| ext == "db" || ext == "sqlite" || ext == "sqlite3")
        || (path.exists() && path.is_file())
}

/// Look for a config file next to the database.
fn find_config_in_dir(data_dir: &Path) -> Option<PathBuf> {
    let extensions = ["toml", "yaml", "yml", "json"];
    let basenames = ["tenderscout", "config"];

    for basename in basenames {
        for ext in extensions {
            let path = data_dir.join(format!("{}.{}", basename, ext));
            if path.exists() {
                return Some(path);
            }
        }
    }
    None
}

async fn load_file_config(options: &LoadOptions, data_dir: Option<&Path>) -> Config {
    // Priority 1: explicit --config flag
    if let Some(ref config_path) = options.config_path {
        return match Config::load_from_path(config_path).await {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!("{}", e);
                Config::default()
            }
        };
    }

    // Priority 2: config next to the data dir
    if let Some(dir) = data_dir {
        if let Some(config_path) = find_config_in_dir(dir) {
            tracing::debug!("Found config next to data dir: {}", config_path.display());
            if let Ok(config) = Config::load_from_path(&config_path).await {
                return config;
            }
        }
    }

    // Priority 3: auto-discover via prefer
    Config::load().await
}

/// Load settings with explicit options.
/// Returns (Settings, Config) tuple.
pub async fn load_settings_with_options(options: LoadOptions) -> (Settings, Config) {
    let data = options.data.as_deref().map(absolute);
    let (data_dir, database_filename) = match data {
        Some(ref path) if is_db_file(path) => (
            path.parent().map(Path::to_path_buf),
            path.file_name()
                .and_then(|n| n.to_str())
                .map(str::to_string),
        ),
        Some(ref path) => (Some(path.clone()), None),
        None => (None, None),
    };

    let config = load_file_config(&options, data_dir.as_deref()).await;

    let base_dir = if options.use_cwd {
        std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."))
    } else {
        config
            .base_dir()
            .unwrap_or_else(|| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")))
    };

    let mut settings = Settings::default();
    config.apply_to_settings(&mut settings, &base_dir);

    // --target takes precedence over the config file
    if let Some(dir) = data_dir {
        settings.data_dir = dir;
    }
    if let Some(filename) = database_filename {
        settings.database_filename = filename;
    }

    // DATABASE_URL environment variable takes highest precedence
    if let Some(database_url) = std::env::var("DATABASE_URL").ok().filter(|s| !s.is_empty()) {
        tracing::debug!("Using DATABASE_URL from environment: {}", database_url);
        settings.database_url = Some(database_url);
    }

    (settings, config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        assert_eq!(settings.page_size, 10);
        assert_eq!(settings.days_back, 7);
        assert_eq!(settings.max_pages, 10_000);
        assert_eq!(settings.max_concurrent, 8);
        assert_eq!(settings.schedule_interval, 7200);
        assert!(!settings.accept_invalid_certs);

        let policy = settings.retry_policy();
        assert_eq!(policy.max_attempts, 3);
        assert_eq!(policy.attempt_timeout, Duration::from_secs(60));
    }

    #[test]
    fn test_default_user_agent_is_fixed_identity() {
        use crate::scrapers::http_client::{resolve_user_agent, IMPERSONATE_USER_AGENTS, USER_AGENT};

        let settings = Settings::default();
        assert_eq!(resolve_user_agent(settings.user_agent.as_deref()), USER_AGENT);

        let settings = Settings {
            user_agent: Some("impersonate".to_string()),
            ..Default::default()
        };
        let drawn = resolve_user_agent(settings.user_agent.as_deref());
        assert!(IMPERSONATE_USER_AGENTS.contains(&drawn.as_str()));
    }

    #[test]
    fn test_database_url_from_path() {
        let settings = Settings::with_data_dir(PathBuf::from("/var/lib/tenders"));
        assert_eq!(
            settings.database_url(),
            "sqlite:/var/lib/tenders/tenderscout.db"
        );

        let settings = Settings {
            database_url: Some("sqlite:/tmp/other.db".to_string()),
            ..Default::default()
        };
        assert_eq!(settings.database_path(), PathBuf::from("/tmp/other.db"));
    }

    #[tokio::test]
    async fn test_load_toml_and_apply() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("tenderscout.toml");
        std::fs::write(
            &path,
            r#"
data_dir = "data"
page_size = 25
engine = "browser"
cpv_code = "45000000-7"
schedule_interval = 300

[browser]
headless = false
remote_url = "ws://localhost:9222"
"#,
        )
        .unwrap();

        let config = Config::load_from_path(&path).await.unwrap();
        let mut settings = Settings::default();
        config.apply_to_settings(&mut settings, &config.base_dir().unwrap());

        assert_eq!(settings.data_dir, dir.path().join("data"));
        assert_eq!(settings.page_size, 25);
        assert_eq!(settings.engine, FetchEngine::Browser);
        assert_eq!(settings.cpv_code.as_deref(), Some("45000000-7"));
        assert_eq!(settings.schedule_config().interval, Duration::from_secs(300));
        assert!(!settings.browser.headless);
        assert_eq!(
            settings.browser.remote_url.as_deref(),
            Some("ws://localhost:9222")
        );
        // untouched keys keep defaults
        assert_eq!(settings.days_back, 7);
    }

    #[tokio::test]
    async fn test_load_yaml() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(&path, "max_pages: 3\naccept_invalid_certs: true\n").unwrap();

        let config = Config::load_from_path(&path).await.unwrap();
        assert_eq!(config.max_pages, Some(3));
        assert_eq!(config.accept_invalid_certs, Some(true));
    }

    #[tokio::test]
    async fn test_load_rejects_bad_json() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("tenderscout.json");
        std::fs::write(&path, "{ not json").unwrap();

        let err = Config::load_from_path(&path).await.unwrap_err();
        assert!(err.contains("JSON"));
    }

    #[test]
    fn test_resolve_path_absolute_and_relative() {
        let config = Config::default();
        let base = Path::new("/etc/tenderscout");
        assert_eq!(
            config.resolve_path("/srv/data", base),
            PathBuf::from("/srv/data")
        );
        assert_eq!(
            config.resolve_path("data", base),
            PathBuf::from("/etc/tenderscout/data")
        );
    }

    #[tokio::test]
    async fn test_target_db_file_sets_dir_and_filename() {
        let dir = tempdir().unwrap();
        let db = dir.path().join("custom.db");
        let (settings, _) = load_settings_with_options(LoadOptions {
            data: Some(db.clone()),
            use_cwd: true,
            ..Default::default()
        })
        .await;

        assert_eq!(settings.data_dir, dir.path());
        assert_eq!(settings.database_filename, "custom.db");
    }
}
