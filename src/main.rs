use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;

use hublink::connection::{EventFilter, HubEvent};
use hublink::service::{self, HubService};
use hublink::ConfigManager;

/// Real-time notification client for the membership hub
#[derive(Parser, Debug)]
#[command(name = "hublink", version)]
struct Cli {
    /// Configuration file path (defaults to ~/.hublink/config.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Hub endpoint URL, overriding the configured one
    #[arg(long, env = "HUBLINK_HUB_URL")]
    hub_url: Option<String>,

    /// Wallet group to join on connect
    #[arg(long, env = "HUBLINK_WALLET")]
    wallet: Option<String>,

    /// Also write logs to daily-rotated files in this directory
    #[arg(long)]
    log_dir: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,
}

fn init_logging(cli: &Cli) -> Result<Option<tracing_appender::non_blocking::WorkerGuard>> {
    let default_level = if cli.verbose { "debug" } else { "info" };
    let env_filter = || {
        tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level))
    };

    if let Some(log_dir) = &cli.log_dir {
        std::fs::create_dir_all(log_dir).context("Failed to create log directory")?;

        use tracing_subscriber::prelude::*;

        let file_appender = tracing_appender::rolling::daily(log_dir, "hublink.log");
        let (file_writer, guard) = tracing_appender::non_blocking(file_appender);

        let console_layer = tracing_subscriber::fmt::layer().with_writer(std::io::stdout);
        let file_layer = tracing_subscriber::fmt::layer()
            .with_writer(file_writer)
            .with_ansi(false);

        tracing_subscriber::registry()
            .with(env_filter())
            .with(console_layer)
            .with(file_layer)
            .init();
        Ok(Some(guard))
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter())
            .init();
        Ok(None)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let _log_guard = init_logging(&cli)?;

    let mut manager =
        ConfigManager::new(cli.config.clone()).context("Failed to load configuration")?;
    if let Some(hub_url) = cli.hub_url {
        manager.config_mut().hub.hub_url = hub_url;
    }
    if let Some(wallet) = cli.wallet {
        manager.config_mut().hub.wallet_guid = Some(wallet);
    }
    info!(config = %manager.config_path().display(), "configuration loaded");

    let hub_service: Arc<HubService> =
        HubService::with_file_storage(manager.config().clone()).context("Failed to wire service")?;
    service::init_global(Arc::clone(&hub_service))?;
    hub_service.attach_toast_bridge();

    let _state_log = hub_service.connection().on_event(
        EventFilter::ConnectionState,
        Arc::new(|event| {
            if let HubEvent::StateChanged { state, reason } = event {
                info!(?state, ?reason, "connection state changed");
            }
        }),
    );

    if let Err(e) = hub_service.connection().start().await {
        // A retry is already scheduled; keep running and let it play out.
        info!("initial connect failed, waiting on retries: {e}");
    }

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;
    info!("shutting down");
    hub_service.connection().stop().await?;

    Ok(())
}
