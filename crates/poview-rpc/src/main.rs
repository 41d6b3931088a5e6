//! Poview RPC Server - JSON-RPC backend for catalog viewer front-ends.
//!
//! This binary provides a JSON-RPC 2.0 server that wraps the poview-core
//! entry viewer for communication with an out-of-process presentation layer.

use anyhow::{anyhow, Result};
use clap::Parser;
use poview_core::{CacheConfig, EntryViewer};
use poview_rpc::server;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(name = "poview-rpc")]
#[command(about = "JSON-RPC server for the poview entry cache")]
struct Args {
    /// Port to listen on (0 = auto-assign)
    #[arg(short, long, default_value = "0")]
    port: u16,

    /// Host to bind to
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    /// Cache setting override, e.g. `--set entry_ttl_secs=30` (repeatable)
    #[arg(long = "set", value_name = "KEY=VALUE")]
    overrides: Vec<String>,
}

fn parse_overrides(overrides: &[String]) -> Result<CacheConfig> {
    let pairs = overrides
        .iter()
        .map(|raw| {
            raw.split_once('=')
                .map(|(k, v)| (k.trim(), v.trim()))
                .ok_or_else(|| anyhow!("Expected KEY=VALUE, got '{}'", raw))
        })
        .collect::<Result<Vec<_>>>()?;
    Ok(CacheConfig::from_pairs(pairs)?)
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Set up logging
    let log_level = if args.debug { Level::DEBUG } else { Level::INFO };
    FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .with_thread_ids(false)
        .compact()
        .init();

    info!("Starting Poview RPC Server");

    let config = parse_overrides(&args.overrides)?;
    info!(
        "Cache: {} entries / {} bytes, {} filter results, ttl {}s",
        config.entry_cache_max_entries,
        config.entry_cache_max_bytes,
        config.filter_cache_max_entries,
        config.entry_ttl_secs
    );

    let viewer = EntryViewer::new(config)?;

    // Start the server
    let addr = server::start_server(viewer, &args.host, args.port).await?;

    // Print port for the front-end to read (intentional stdout for IPC)
    println!("RPC_PORT={}", addr.port());

    info!("RPC server running on {}", addr);

    // Wait for shutdown signal
    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received, exiting");

    Ok(())
}
