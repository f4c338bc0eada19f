use clap::Parser;
use page_reader::{setup_logging, Cli, CliRunner, Config};
use tokio::signal;
use tracing::{error, info};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse command line arguments
    let args = Cli::parse();

    // Setup logging
    setup_logging(args.verbose)?;

    info!("Starting page-reader v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let config = load_config(&args).await?;

    // Create CLI runner
    let cli_runner = CliRunner::new(config, &args).await?;

    // Setup graceful shutdown
    let (shutdown_tx, mut shutdown_rx) = tokio::sync::broadcast::channel(1);
    let _shutdown_handler = setup_shutdown_handler(shutdown_tx);

    let result = tokio::select! {
        result = cli_runner.run(args.command) => {
            info!("Application completed");
            result
        }
        _ = shutdown_rx.recv() => {
            info!("Received shutdown signal");
            Ok(())
        }
    };

    // Cleanup
    info!("Shutting down...");
    cli_runner.service.shutdown().await;

    if let Err(e) = result {
        error!("Application error: {:#}", e);
        std::process::exit(1);
    }

    info!("page-reader stopped");
    Ok(())
}

async fn load_config(args: &Cli) -> anyhow::Result<Config> {
    // Load from file if specified
    let mut config = if let Some(config_path) = &args.config {
        let config_content = tokio::fs::read_to_string(config_path).await?;
        serde_json::from_str(&config_content)?
    } else {
        Config::default()
    };

    // Override with command line arguments
    if let Some(chrome_path) = &args.chrome_path {
        config.chrome_path = Some(chrome_path.clone());
    }

    if let Some(storage_dir) = &args.storage_dir {
        config.storage_dir = storage_dir.clone();
    }

    apply_env_overrides(&mut config)?;

    // Validate configuration
    config.validate()?;

    info!("Configuration loaded successfully");
    info!("Listen address: {}:{}", config.bind, config.port);
    info!(
        "Viewport: {}x{}",
        config.viewport.width, config.viewport.height
    );
    info!("Screenshot storage: {}", config.storage_dir.display());

    Ok(config)
}

fn apply_env_overrides(config: &mut Config) -> anyhow::Result<()> {
    if let Ok(port) = std::env::var("PORT") {
        config.port = port
            .parse()
            .map_err(|e| anyhow::anyhow!("Invalid PORT {port:?}: {e}"))?;
    }

    if let Ok(port) = std::env::var("MCP_PORT") {
        config.mcp_port = port
            .parse()
            .map_err(|e| anyhow::anyhow!("Invalid MCP_PORT {port:?}: {e}"))?;
    }

    if config.chrome_path.is_none() {
        config.chrome_path = std::env::var("CHROME_PATH")
            .or_else(|_| std::env::var("PUPPETEER_EXECUTABLE_PATH"))
            .ok()
            .filter(|path| !path.is_empty());
    }

    Ok(())
}

fn setup_shutdown_handler(
    shutdown_tx: tokio::sync::broadcast::Sender<()>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut sigint = match signal::unix::signal(signal::unix::SignalKind::interrupt()) {
            Ok(signal) => signal,
            Err(e) => {
                error!("Failed to create SIGINT handler: {}", e);
                return;
            }
        };
        let mut sigterm = match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(signal) => signal,
            Err(e) => {
                error!("Failed to create SIGTERM handler: {}", e);
                return;
            }
        };

        tokio::select! {
            _ = sigint.recv() => {
                info!("Received SIGINT");
            }
            _ = sigterm.recv() => {
                info!("Received SIGTERM");
            }
        }

        let _ = shutdown_tx.send(());
    })
}
