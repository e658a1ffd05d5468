//! lazykv server entry point.
//!
//! Sets up logging, the shared store and the TCP accept loop.

use clap::Parser;
use lazykv::commands::CommandExecutor;
use lazykv::connection::{handle_connection, ConnectionLimits, ConnectionStats};
use lazykv::storage::Store;
use lazykv::Config;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::parse();

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_level))?;
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    info!(version = lazykv::VERSION, "Starting lazykv");

    // One store for the whole process, shared by every connection.
    let store = Arc::new(Store::new());
    let stats = Arc::new(ConnectionStats::new());

    let listener = TcpListener::bind(config.bind_address()).await?;
    info!("Listening on {}", config.bind_address());

    let limits = config.connection_limits();
    tokio::select! {
        _ = accept_loop(listener, Arc::clone(&store), Arc::clone(&stats), limits) => {}
        result = signal::ctrl_c() => {
            result?;
            info!("Shutdown signal received, stopping server...");
        }
    }

    let store_stats = store.stats();
    info!(
        keys = store_stats.keys,
        gets = store_stats.gets,
        sets = store_stats.sets,
        hits = store_stats.hits,
        misses = store_stats.misses,
        expired = store_stats.expired,
        connections = stats.connections_accepted.load(Ordering::Relaxed),
        commands = stats.commands_processed.load(Ordering::Relaxed),
        "Server shutdown complete"
    );
    Ok(())
}

/// Accepts connections and spawns one task per client.
async fn accept_loop(
    listener: TcpListener,
    store: Arc<Store>,
    stats: Arc<ConnectionStats>,
    limits: ConnectionLimits,
) {
    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                let executor = CommandExecutor::new(Arc::clone(&store));
                let stats = Arc::clone(&stats);

                tokio::spawn(handle_connection(stream, addr, executor, stats, limits));
            }
            Err(e) => {
                error!("Failed to accept connection: {}", e);
            }
        }
    }
}
