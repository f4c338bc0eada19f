//! Configuration management with serde serialization/deserialization
//!
//! This module holds the service configuration, the per-request scraping
//! options, and the total mapping from raw request metadata to those options.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Navigation ceiling applied when a request does not name one.
pub const DEFAULT_TIMEOUT_MS: u64 = 30_000;

/// Largest navigation ceiling a request may ask for; larger values are clamped.
pub const MAX_TIMEOUT_MS: u64 = 180_000;

/// Deadline chromiumoxide applies to each CDP command, `goto` included.
///
/// Kept above [`MAX_TIMEOUT_MS`] so the per-request navigation timeout always
/// fires first.
pub const BROWSER_REQUEST_TIMEOUT: Duration = Duration::from_millis(MAX_TIMEOUT_MS + 10_000);

/// Budget for each best-effort `wait-for-selector` entry.
pub const DEFAULT_SELECTOR_WAIT: Duration = Duration::from_millis(5_000);

/// Main configuration structure for the reader service
///
/// Every field has a default, so a configuration file only needs to name the
/// values it changes.
///
/// # Examples
///
/// ```rust
/// use page_reader::Config;
///
/// let config = Config {
///     port: 8080,
///     ..Default::default()
/// };
/// assert_eq!(config.viewport.width, 1920);
/// ```
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    /// Address the HTTP front end binds to (default: 0.0.0.0)
    pub bind: String,

    /// Port the HTTP front end listens on (default: 3000)
    pub port: u16,

    /// Port the MCP tool server listens on (default: 8000)
    pub mcp_port: u16,

    /// Path to Chrome/Chromium executable (default: auto-detect)
    pub chrome_path: Option<String>,

    /// Fixed viewport of the session page
    pub viewport: Viewport,

    /// Upper bound on the browser process start (default: 10 seconds)
    pub launch_timeout: Duration,

    /// Budget for each `wait-for-selector` entry (default: 5 seconds)
    ///
    /// Misses are ignored; this never aborts a request.
    pub selector_wait: Duration,

    /// Root directory for persisted screenshots (default: ./local-storage)
    pub storage_dir: PathBuf,

    /// Where screenshots are kept
    pub storage_backend: StorageBackend,

    /// Absolute base used in screenshot redirects (default: derived from the
    /// request's Host header)
    pub public_base_url: Option<String>,

    /// Install the Prometheus recorder and serve `/metrics` (default: false)
    pub metrics_enabled: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0".to_string(),
            port: 3000,
            mcp_port: 8000,
            chrome_path: None,
            viewport: Viewport::default(),
            launch_timeout: Duration::from_secs(10),
            selector_wait: DEFAULT_SELECTOR_WAIT,
            storage_dir: PathBuf::from("./local-storage"),
            storage_backend: StorageBackend::Filesystem,
            public_base_url: None,
            metrics_enabled: false,
        }
    }
}

impl Config {
    pub fn validate(&self) -> Result<(), crate::ReaderError> {
        use crate::ReaderError::Configuration;

        if self.port == 0 || self.mcp_port == 0 {
            return Err(Configuration("Port must be greater than 0".into()));
        }
        if self.viewport.width == 0 || self.viewport.height == 0 {
            return Err(Configuration(
                "Viewport dimensions must be greater than 0".into(),
            ));
        }
        if self.launch_timeout.is_zero() {
            return Err(Configuration(
                "Launch timeout must be greater than 0".into(),
            ));
        }
        if let Some(base) = &self.public_base_url {
            url::Url::parse(base)
                .map_err(|e| Configuration(format!("Invalid public base URL {base}: {e}")))?;
        }
        Ok(())
    }
}

/// Browser viewport of the session page
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Viewport {
    /// Viewport width in pixels (default: 1920)
    pub width: u32,

    /// Viewport height in pixels (default: 1080)
    pub height: u32,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            width: 1920,
            height: 1080,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// Files under `<storage_dir>/instant-screenshots`
    Filesystem,
    /// Process memory; lost on restart
    Memory,
}

/// Output representation selected by the caller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseMode {
    #[default]
    Markdown,
    Html,
    Text,
    /// Viewport screenshot reference
    Screenshot,
    /// Full-page screenshot reference
    Pageshot,
}

impl ResponseMode {
    pub fn is_screenshot(&self) -> bool {
        matches!(self, ResponseMode::Screenshot | ResponseMode::Pageshot)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ResponseMode::Markdown => "markdown",
            ResponseMode::Html => "html",
            ResponseMode::Text => "text",
            ResponseMode::Screenshot => "screenshot",
            ResponseMode::Pageshot => "pageshot",
        }
    }
}

impl FromStr for ResponseMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "markdown" => Ok(ResponseMode::Markdown),
            "html" => Ok(ResponseMode::Html),
            "text" => Ok(ResponseMode::Text),
            "screenshot" => Ok(ResponseMode::Screenshot),
            "pageshot" => Ok(ResponseMode::Pageshot),
            other => Err(format!("unknown response mode: {other}")),
        }
    }
}

/// Per-request constraints on a single page load.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScrapingOptions {
    pub favor_screenshot: bool,
    /// Hard ceiling on navigation only; in `1..=MAX_TIMEOUT_MS`.
    pub timeout_ms: u64,
    pub override_user_agent: Option<String>,
    pub wait_for_selector: Vec<String>,
}

impl ScrapingOptions {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Default for ScrapingOptions {
    fn default() -> Self {
        Self {
            favor_screenshot: false,
            timeout_ms: DEFAULT_TIMEOUT_MS,
            override_user_agent: None,
            wait_for_selector: Vec::new(),
        }
    }
}

/// Request metadata exactly as received, before any defaulting.
#[derive(Debug, Clone, Default)]
pub struct RawRequestOptions {
    pub respond_with: Option<String>,
    pub timeout: Option<String>,
    pub user_agent: Option<String>,
    pub wait_for_selector: Vec<String>,
}

/// Normalized request: the output mode plus the scraping constraints.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RequestOptions {
    pub mode: ResponseMode,
    pub scraping: ScrapingOptions,
}

impl From<RawRequestOptions> for RequestOptions {
    /// Total mapping: every input yields options, unknown or malformed values
    /// fall back to their defaults.
    fn from(raw: RawRequestOptions) -> Self {
        let mode = raw
            .respond_with
            .as_deref()
            .and_then(|value| match value.parse::<ResponseMode>() {
                Ok(mode) => Some(mode),
                Err(e) => {
                    tracing::debug!("{e}, falling back to markdown");
                    None
                }
            })
            .unwrap_or_default();

        let timeout_ms = raw
            .timeout
            .as_deref()
            .and_then(|value| value.trim().parse::<u64>().ok())
            .filter(|ms| *ms > 0)
            .map(|ms| ms.min(MAX_TIMEOUT_MS))
            .unwrap_or(DEFAULT_TIMEOUT_MS);

        let override_user_agent = raw
            .user_agent
            .map(|ua| ua.trim().to_string())
            .filter(|ua| !ua.is_empty());

        let wait_for_selector = raw
            .wait_for_selector
            .into_iter()
            .map(|selector| selector.trim().to_string())
            .filter(|selector| !selector.is_empty())
            .collect();

        Self {
            mode,
            scraping: ScrapingOptions {
                favor_screenshot: mode.is_screenshot(),
                timeout_ms,
                override_user_agent,
                wait_for_selector,
            },
        }
    }
}

/// Generate Chrome command-line arguments for the session browser
///
/// The hardened set is fixed: no sandbox (containerized execution), no GPU,
/// single process.
///
/// # Examples
///
/// ```rust
/// use page_reader::{Config, get_chrome_args};
///
/// let args = get_chrome_args(&Config::default());
/// assert!(args.contains(&"--single-process".to_string()));
/// ```
pub fn get_chrome_args(config: &Config) -> Vec<String> {
    vec![
        "--no-sandbox".to_string(),
        "--disable-setuid-sandbox".to_string(),
        "--disable-dev-shm-usage".to_string(),
        "--single-process".to_string(),
        "--disable-gpu".to_string(),
        "--no-first-run".to_string(),
        format!(
            "--window-size={},{}",
            config.viewport.width, config.viewport.height
        ),
    ]
}

pub fn create_browser_config(
    config: &Config,
) -> Result<chromiumoxide::browser::BrowserConfig, crate::ReaderError> {
    use chromiumoxide::browser::BrowserConfig;

    let user_data_dir =
        std::env::temp_dir().join(format!("page-reader-{}", std::process::id()));

    let mut builder = BrowserConfig::builder()
        .window_size(config.viewport.width, config.viewport.height)
        .launch_timeout(config.launch_timeout)
        .request_timeout(BROWSER_REQUEST_TIMEOUT)
        .user_data_dir(user_data_dir)
        .args(get_chrome_args(config));

    if let Some(chrome_path) = &config.chrome_path {
        builder = builder.chrome_executable(chrome_path);
    }

    builder
        .build()
        .map_err(crate::ReaderError::BrowserLaunchFailed)
}
