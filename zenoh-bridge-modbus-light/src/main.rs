//! Zenoh bridge for Modbus lights.
//!
//! Polls coil/register backed lights over Modbus TCP or RTU, publishes their
//! state to Zenoh and accepts ON/OFF commands.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::sync::watch;
use tracing::info;
use zenoh_bridge_modbus_light::config::LoggingConfig;
use zenoh_bridge_modbus_light::{LightBridge, LightBridgeConfig, logging, session};

/// Zenoh bridge for Modbus lights (TCP/RTU).
#[derive(Parser, Debug)]
#[command(name = "zenoh-bridge-modbus-light")]
#[command(about = "Polls and drives Modbus coil/register lights over Zenoh")]
#[command(version)]
struct Args {
    /// Path to configuration file (JSON5 format)
    #[arg(short, long, default_value = "modbus-light.json5")]
    config: PathBuf,

    /// Override log level (trace, debug, info, warn, error).
    #[arg(long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = LightBridgeConfig::load_from_file(&args.config)
        .with_context(|| format!("Failed to load config from {:?}", args.config))?;

    let log_config = LoggingConfig {
        level: args
            .log_level
            .clone()
            .unwrap_or_else(|| config.logging.level.clone()),
        format: config.logging.format,
    };
    logging::init_tracing(&log_config).context("Failed to init tracing")?;

    info!("Starting zenoh-bridge-modbus-light");
    info!("Loaded configuration from {:?}", args.config);

    let bridge = LightBridge::new(config.clone()).context("Failed to build bridge")?;

    let session = session::connect(&config.zenoh)
        .await
        .context("Failed to connect to Zenoh")?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let run = tokio::spawn(bridge.run(session.clone(), shutdown_rx));

    tokio::signal::ctrl_c().await?;
    info!("Received shutdown signal");
    let _ = shutdown_tx.send(true);

    run.await
        .context("Bridge task panicked")?
        .context("Bridge failed")?;

    session
        .close()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to close Zenoh session: {}", e))?;
    info!("Modbus light bridge stopped");

    Ok(())
}
