use std::{path::PathBuf, sync::Arc};

use anyhow::Context;
use clap::Parser;
use fleetcast::{
    logging::init_logging,
    network::{log_banner, serve, AppState, BannerInfo},
    Pipeline, PipelineOptions, Settings, StorageEngine, TelemetryStore,
};
use tokio::net::TcpListener;
use tracing::{error, info};

/// Real-time fleet telemetry fan-out server.
#[derive(Debug, Parser)]
#[command(version, about)]
struct Cli {
    /// TOML configuration file.
    #[arg(short, long, env = "FLEETCAST_CONFIG")]
    config: Option<PathBuf>,

    /// Listen address, overrides `listen_address` from the configuration.
    #[arg(short, long)]
    listen: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut settings = Settings::load_from(cli.config.as_deref()).context("failed to load settings")?;
    if let Some(listen) = cli.listen {
        settings.listen_address = listen;
    }

    let logging = init_logging(&settings.logging).map_err(|e| anyhow::anyhow!(e))?;

    let storage = format!("{:?}", settings.storage.storage_type).to_lowercase();
    log_banner(&BannerInfo {
        listen: &settings.listen_address,
        storage: &storage,
        sync_interval_ms: settings.sync.interval_ms,
        auto_sync: settings.sync.auto_start,
    });

    let engine = StorageEngine::initialize(&settings.storage)
        .await
        .context("failed to initialize storage")?;
    let store = TelemetryStore::new(Arc::new(engine));
    let pipeline = Pipeline::start(store, PipelineOptions::from(&settings))?;

    if settings.sync.auto_start {
        pipeline.sync.start();
    }

    let listener = TcpListener::bind(&settings.listen_address)
        .await
        .with_context(|| format!("failed to bind {}", settings.listen_address))?;

    let served = serve(listener, AppState::new(pipeline.clone()), shutdown_signal()).await;
    if let Err(e) = &served {
        error!(error = %e, "HTTP server failed");
    }

    pipeline.shutdown().await;
    info!("fleetcast stopped");
    logging.shutdown().await;

    served.map_err(Into::into)
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Shutdown signal received"),
        Err(e) => error!(error = %e, "Failed to listen for Ctrl-C"),
    }
}
