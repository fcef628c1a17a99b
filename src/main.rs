// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/fieldwatch-rs

//! FieldWatch - Generator Excitation Monitoring System
//!
//! Headless daemon that polls generator telemetry over Modbus TCP, derives
//! the excitation-current fault signal per unit, persists every reading,
//! and streams each cycle to connected WebSocket viewers.

use anyhow::{anyhow, Context as _, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use fieldwatch::acquisition::{AcquisitionPipeline, ModbusTransport};
use fieldwatch::core::{Broadcaster, Engine};
use fieldwatch::db::Database;
use fieldwatch::streaming::WebSocketServer;
use fieldwatch::{Config, VERSION};

/// FieldWatch - Generator Excitation Monitoring System
#[derive(Parser, Debug)]
#[command(name = "fieldwatch")]
#[command(author = "FieldWatch Project")]
#[command(version = VERSION)]
#[command(about = "Generator excitation telemetry acquisition and fault monitoring")]
struct Args {
    /// Configuration file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    /// Enable trace-level logging
    #[arg(long)]
    trace: bool,

    /// Modbus endpoint host override
    #[arg(long)]
    host: Option<String>,

    /// Modbus endpoint port override
    #[arg(long)]
    port: Option<u16>,

    /// WebSocket server port override
    #[arg(long)]
    ws_port: Option<u16>,

    /// Poll interval in seconds override
    #[arg(long)]
    interval: Option<f64>,

    /// Data output directory
    #[arg(long)]
    data_dir: Option<PathBuf>,
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let log_level = if args.trace {
        Level::TRACE
    } else if args.debug {
        Level::DEBUG
    } else {
        Level::INFO
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .with_thread_ids(true)
        .with_file(args.debug)
        .with_line_number(args.debug)
        .with_ansi(true)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    info!("FieldWatch v{} - Generator Excitation Monitoring System", VERSION);

    // Load or create configuration
    let config_path = args.config.unwrap_or_else(Config::default_path);
    let mut config = Config::load_or_create(&config_path)?;

    // Override with command line args
    if let Some(host) = args.host {
        config.transport.host = host;
    }
    if let Some(port) = args.port {
        config.transport.port = port;
    }
    if let Some(ws_port) = args.ws_port {
        config.streaming.websocket_port = ws_port;
    }
    if let Some(interval) = args.interval {
        config.acquisition.interval_secs = interval;
    }
    if let Some(data_dir) = args.data_dir {
        config.database.path = data_dir.join("fieldwatch.db");
        config.data_dir = data_dir;
    }

    config.validate().context("invalid configuration")?;

    info!("Configuration loaded from {:?}", config_path);
    info!(
        "Monitoring {} generators at {}:{} ({:?} layout)",
        config.transport.generator_count,
        config.transport.host,
        config.transport.port,
        config.transport.layout
    );

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(run(config))
}

async fn run(config: Config) -> Result<()> {
    let config = Arc::new(config);

    // Persistence
    let database = if config.database.enabled {
        Some(Arc::new(Database::open(&config.database)?))
    } else {
        info!("Persistence disabled by configuration");
        None
    };

    let broadcaster = Arc::new(Broadcaster::new(64));
    let (shutdown_tx, _) = broadcast::channel(4);

    // Daily retention pass; readings are append-only otherwise
    if let Some(database) = &database {
        let database = database.clone();
        let retention_days = config.database.retention_days;
        let mut shutdown = shutdown_tx.subscribe();
        tokio::spawn(async move {
            let mut tick = tokio::time::interval(Duration::from_secs(24 * 60 * 60));
            loop {
                tokio::select! {
                    _ = tick.tick() => {
                        let database = database.clone();
                        let _ = tokio::task::spawn_blocking(move || {
                            if let Err(e) = database.cleanup(retention_days) {
                                warn!("Retention cleanup failed: {e}");
                            }
                        })
                        .await;
                    }
                    _ = shutdown.recv() => break,
                }
            }
        });
    }

    // Streaming
    if config.streaming.websocket_enabled {
        let server = WebSocketServer::new(config.streaming.clone(), broadcaster.clone());
        server.start(shutdown_tx.subscribe()).await?;
    }

    // Transport and pipeline; a dead endpoint at startup is a hard error
    let transport = ModbusTransport::connect(&config.transport)
        .await
        .map_err(|e| anyhow!("cannot reach Modbus endpoint {}:{}: {e}", config.transport.host, config.transport.port))?;

    let pipeline = AcquisitionPipeline::new(
        Box::new(transport),
        &config.transport,
        &config.acquisition,
        config.machines.pairs.clone(),
    );

    let mut engine = Engine::new(config.clone(), pipeline, database, broadcaster);
    let engine_shutdown = shutdown_tx.subscribe();
    let engine_handle = tokio::spawn(async move { engine.run(engine_shutdown).await });

    info!("FieldWatch running; press Ctrl+C to stop");
    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received, cleaning up...");

    let _ = shutdown_tx.send(());
    engine_handle.await??;

    info!("FieldWatch shutdown complete");
    Ok(())
}
