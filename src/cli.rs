use crate::{
    format_bytes, install_prometheus_recorder, serve, serve_mcp, AppState, BrowserSession, Config,
    LocalScreenshotStore, MemoryScreenshotStore, Metrics, PageReader, RawRequestOptions,
    ReadOutcome, ReaderService, RequestOptions, ScreenshotSink, StorageBackend,
    SCREENSHOT_ROUTE_PREFIX,
};
use clap::{Parser, Subcommand};
use metrics_exporter_prometheus::PrometheusHandle;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "page-reader")]
#[command(about = "Render web pages in headless Chrome and return them as markdown, html, text or screenshots")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    #[arg(long, global = true, help = "Configuration file path")]
    pub config: Option<PathBuf>,

    #[arg(long, global = true, help = "Enable verbose logging")]
    pub verbose: bool,

    #[arg(long, global = true, help = "Chrome executable path")]
    pub chrome_path: Option<String>,

    #[arg(long, global = true, help = "Directory for stored screenshots")]
    pub storage_dir: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the HTTP reader service
    Serve {
        #[arg(short, long, help = "Server port")]
        port: Option<u16>,

        #[arg(long, help = "Bind address")]
        bind: Option<String>,

        #[arg(long, help = "Expose Prometheus metrics on /metrics")]
        metrics: bool,
    },

    /// Run the MCP tool server (get_markdown, get_html, get_text, get_screenshot, get_pageshot)
    Mcp {
        #[arg(short, long, help = "Server port")]
        port: Option<u16>,

        #[arg(long, help = "Bind address")]
        bind: Option<String>,
    },

    /// Read a single URL and print the result
    Read {
        #[arg(help = "URL to read")]
        url: String,

        #[arg(short, long, default_value = "markdown", help = "Output mode (markdown, html, text, screenshot, pageshot)")]
        respond_with: String,

        #[arg(long, help = "Navigation timeout in milliseconds")]
        timeout: Option<u64>,

        #[arg(long, help = "User agent override")]
        user_agent: Option<String>,

        #[arg(long, help = "CSS selector to wait for (repeatable)")]
        wait_for_selector: Vec<String>,

        #[arg(short, long, help = "Write the result to this file instead of stdout")]
        output: Option<PathBuf>,
    },

    /// Validate configuration
    Validate {
        #[arg(short, long, help = "Configuration file to validate")]
        config: PathBuf,
    },
}

pub struct CliRunner {
    pub config: Config,
    pub service: Arc<ReaderService>,
    metrics_handle: Option<PrometheusHandle>,
}

impl CliRunner {
    pub async fn new(config: Config, args: &Cli) -> anyhow::Result<Self> {
        let serve_metrics = matches!(args.command, Commands::Serve { metrics: true, .. });
        let metrics_handle = if config.metrics_enabled || serve_metrics {
            Some(install_prometheus_recorder()?)
        } else {
            None
        };
        let metrics = Arc::new(Metrics::new());

        let sink: Arc<dyn ScreenshotSink> = match config.storage_backend {
            StorageBackend::Filesystem => {
                let store = LocalScreenshotStore::new(&config.storage_dir);
                store.ensure_dir().await?;
                info!("Storing screenshots in {}", store.dir().display());
                Arc::new(store)
            }
            StorageBackend::Memory => Arc::new(MemoryScreenshotStore::new()),
        };

        let session = Arc::new(BrowserSession::new(config.clone()));
        let page_reader = Arc::new(PageReader::new(session).with_selector_wait(config.selector_wait));
        let service = Arc::new(ReaderService::new(page_reader, sink, metrics));

        Ok(Self {
            config,
            service,
            metrics_handle,
        })
    }

    pub async fn run(&self, command: Commands) -> anyhow::Result<()> {
        match command {
            Commands::Serve { port, bind, .. } => self.run_server(port, bind).await,
            Commands::Mcp { port, bind } => self.run_mcp_server(port, bind).await,
            Commands::Read {
                url,
                respond_with,
                timeout,
                user_agent,
                wait_for_selector,
                output,
            } => {
                let raw = RawRequestOptions {
                    respond_with: Some(respond_with),
                    timeout: timeout.map(|ms| ms.to_string()),
                    user_agent,
                    wait_for_selector,
                };
                self.run_read(&url, RequestOptions::from(raw), output).await
            }
            Commands::Validate { config } => validate_config_file(config).await,
        }
    }

    pub async fn run_server(&self, port: Option<u16>, bind: Option<String>) -> anyhow::Result<()> {
        let port = port.unwrap_or(self.config.port);
        let bind = bind.unwrap_or_else(|| self.config.bind.clone());

        serve(self.app_state(), &bind, port).await?;
        Ok(())
    }

    pub async fn run_mcp_server(&self, port: Option<u16>, bind: Option<String>) -> anyhow::Result<()> {
        let port = port.unwrap_or(self.config.mcp_port);
        let bind = bind.unwrap_or_else(|| self.config.bind.clone());

        serve_mcp(self.app_state(), &bind, port).await?;
        Ok(())
    }

    fn app_state(&self) -> AppState {
        AppState {
            service: self.service.clone(),
            public_base_url: self.config.public_base_url.clone(),
            metrics: self.metrics_handle.clone(),
        }
    }

    pub async fn run_read(
        &self,
        url: &str,
        options: RequestOptions,
        output: Option<PathBuf>,
    ) -> anyhow::Result<()> {
        info!("Reading: {} ({})", url, options.mode.as_str());

        let response = match self.service.read(url, &options).await? {
            ReadOutcome::Rendered(response) => response,
            ReadOutcome::Failed(message) => anyhow::bail!("Read failed: {message}"),
        };

        if let Some(reference) = response.screenshot_reference() {
            let destination = output.unwrap_or_else(|| {
                self.config
                    .storage_dir
                    .join(reference.trim_start_matches('/'))
            });
            let size =
                write_screenshot(self.service.sink().as_ref(), reference, &destination).await?;
            println!("Read {} successfully:", response.url);
            println!("  Title: {}", response.title);
            println!("  Screenshot: {}", destination.display());
            println!("  Size: {}", format_bytes(size));
            return Ok(());
        }

        let body = match response.text_body() {
            Some(body) => body.to_string(),
            None => {
                warn!("No screenshot was captured");
                response.to_json()?
            }
        };

        match output {
            Some(path) => {
                if let Some(parent) = path.parent() {
                    fs::create_dir_all(parent).await?;
                }
                fs::write(&path, &body).await?;
                println!("Read {} successfully:", response.url);
                println!("  Title: {}", response.title);
                println!("  Output: {}", path.display());
                println!("  Size: {}", format_bytes(body.len()));
            }
            None => print!("{body}"),
        }

        Ok(())
    }
}

/// Copies a published screenshot out of `sink` into `destination`.
pub async fn write_screenshot(
    sink: &dyn ScreenshotSink,
    reference: &str,
    destination: &Path,
) -> anyhow::Result<usize> {
    let id = reference
        .strip_prefix(SCREENSHOT_ROUTE_PREFIX)
        .unwrap_or(reference)
        .trim_start_matches('/');

    let bytes = sink
        .get(id)
        .await?
        .ok_or_else(|| anyhow::anyhow!("Published screenshot {id} is missing"))?;

    if let Some(parent) = destination.parent() {
        fs::create_dir_all(parent).await?;
    }
    fs::write(destination, &bytes).await?;
    Ok(bytes.len())
}

pub async fn validate_config_file(config_path: PathBuf) -> anyhow::Result<()> {
    println!("Validating configuration: {}", config_path.display());

    let config_content = fs::read_to_string(&config_path).await?;
    let config: Config = serde_json::from_str(&config_content)?;
    config.validate()?;

    println!("Configuration is valid:");
    println!("  Listen: {}:{}", config.bind, config.port);
    println!("  MCP port: {}", config.mcp_port);
    println!(
        "  Viewport: {}x{}",
        config.viewport.width, config.viewport.height
    );
    println!("  Launch timeout: {:?}", config.launch_timeout);
    println!("  Selector wait: {:?}", config.selector_wait);
    println!(
        "  Storage: {:?} ({})",
        config.storage_backend,
        config.storage_dir.display()
    );

    Ok(())
}

pub fn setup_logging(verbose: bool) -> anyhow::Result<()> {
    let level = if verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };

    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    Ok(())
}
