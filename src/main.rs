// Webhooker - Main Entry Point
//
// Startup sequence:
// - Resolve the configuration path (CLI, WEBHOOKER_CONFIG_PATH, default)
// - Load the configuration and set up logging
// - Populate the registry once, then serve the relay
//
// Any failure before serving begins aborts the process.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};
use webhooker::config::{Config, CONFIG_PATH_ENV, DEFAULT_CONFIG_PATH};
use webhooker::{logging, metrics_server, server, Dispatcher, Registry};

/// Webhooker: webhook fan-out relay
#[derive(Parser, Debug)]
#[command(name = "webhooker")]
#[command(author = "Webhooker Contributors")]
#[command(version = "0.1.0")]
#[command(about = "Relays inbound webhooks to every registered target", long_about = None)]
struct Args {
    /// Path to the YAML configuration file
    #[arg(short, long, env = CONFIG_PATH_ENV)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let (config_path, from_default) = match args.config {
        Some(path) => (path, false),
        None => (PathBuf::from(DEFAULT_CONFIG_PATH), true),
    };

    let config = Config::load_from_path(&config_path)?;

    logging::init(config.debug || args.verbose);

    if from_default {
        warn!(WEBHOOKER_CONFIG_PATH = %config_path.display(), "using default config path");
    } else {
        info!(WEBHOOKER_CONFIG_PATH = %config_path.display(), "using provided config path");
    }

    let registry = Arc::new(Registry::new());
    registry.init().await;
    config
        .register_webhooks(&registry)
        .await
        .context("Failed to load webhook definitions")?;

    if config.metrics.enabled {
        let config = config.clone();
        let registry = Arc::clone(&registry);
        tokio::spawn(async move {
            if let Err(e) = metrics_server::run(&config, registry).await {
                error!("Metrics server stopped: {:#}", e);
            }
        });
    }

    let dispatcher = Dispatcher::new(registry);
    let result = server::run(&config, dispatcher).await;
    if let Err(e) = &result {
        error!("finished: {:#}", e);
    }
    result
}
