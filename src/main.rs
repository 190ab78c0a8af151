//! respkv - An In-Memory Key-Value Server Speaking RESP
//!
//! This is the main entry point for the respkv server.
//! It sets up logging, the TCP listener, storage engine, and handles incoming connections.

use anyhow::Context;
use clap::Parser;
use respkv::commands::CommandHandler;
use respkv::config::{ConfigSource, FileConfig, ServerArgs};
use respkv::connection::{handle_connection, ConnectionStats};
use respkv::storage::{ExpirySweeper, StorageEngine};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

fn init_logging(level: &str) -> anyhow::Result<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(level)
            .with_context(|| format!("invalid log level '{}'", level))?,
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .init();

    Ok(())
}

fn print_banner(args: &ServerArgs) {
    println!(
        r#"
respkv v{} - In-Memory Key-Value Server
──────────────────────────────────────────────────────────────
Server started on {}
Configuration file: {}
Ready to accept connections.

Use Ctrl+C to shutdown gracefully.
"#,
        respkv::VERSION,
        args.bind_address(),
        args.config.display()
    );
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = ServerArgs::parse();

    init_logging(&args.log_level)?;

    print_banner(&args);

    // Create the storage engine (shared across all connections)
    let storage = Arc::new(StorageEngine::new());

    let sweeper = ExpirySweeper::start(Arc::clone(&storage), args.expiry_config());

    let config_source = FileConfig::new(args.config.clone());
    if let Err(e) = config_source.read_all() {
        warn!(path = %args.config.display(), error = %e, "CONFIG GET will return no parameters");
    }
    let config: Arc<dyn ConfigSource> = Arc::new(config_source);

    let stats = Arc::new(ConnectionStats::new());

    let listener = TcpListener::bind(args.bind_address())
        .await
        .with_context(|| format!("failed to bind {}", args.bind_address()))?;
    info!("Listening on {}", args.bind_address());

    tokio::select! {
        _ = accept_loop(listener, Arc::clone(&storage), config, Arc::clone(&stats)) => {}
        result = signal::ctrl_c() => {
            if let Err(e) = result {
                error!(error = %e, "Failed to listen for Ctrl+C");
            }
            info!("Shutdown signal received, stopping server...");
        }
    }

    sweeper.stop();

    let storage_stats = storage.stats();
    info!(
        keys = storage_stats.keys,
        pending_deadlines = storage_stats.pending_deadlines,
        get_ops = storage_stats.get_ops,
        set_ops = storage_stats.set_ops,
        expired = storage_stats.expired,
        "Storage statistics"
    );
    info!(
        connections = stats.connections_accepted.load(Ordering::Relaxed),
        active = stats.active_connections.load(Ordering::Relaxed),
        commands = stats.commands_processed.load(Ordering::Relaxed),
        protocol_errors = stats.protocol_errors.load(Ordering::Relaxed),
        bytes_read = stats.bytes_read.load(Ordering::Relaxed),
        bytes_written = stats.bytes_written.load(Ordering::Relaxed),
        "Connection statistics"
    );

    info!("Server shutdown complete");
    Ok(())
}

/// Main loop that accepts incoming connections
async fn accept_loop(
    listener: TcpListener,
    storage: Arc<StorageEngine>,
    config: Arc<dyn ConfigSource>,
    stats: Arc<ConnectionStats>,
) {
    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                let handler = CommandHandler::new(Arc::clone(&storage), Arc::clone(&config));
                let stats = Arc::clone(&stats);

                tokio::spawn(handle_connection(stream, addr, handler, stats));
            }
            Err(e) => {
                error!("Failed to accept connection: {}", e);
            }
        }
    }
}
