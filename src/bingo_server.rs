// src/bingo_server.rs
// Draw server entry point: loads the stored sessions and serves the JSON API
// until interrupted.

use std::error::Error;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::Ordering;

use clap::Parser;
use bingosys::config::{ServerConfig, SERVER_CONFIG_PATH};
use bingosys::logging::{log_error, log_info};
use bingosys::server::{start_server, AppState};
use bingosys::session::SessionRegistry;
use bingosys::store::JsonFileStore;

#[derive(Parser)]
#[command(name = env!("CARGO_BIN_NAME"))]
#[command(about = "Bingo Draw Server - Multi-session draw engine with prize scoring")]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Args {
    /// Configuration file
    #[arg(short, long, default_value = SERVER_CONFIG_PATH)]
    config: PathBuf,

    /// Listen on this port instead of the configured one
    #[arg(short, long)]
    port: Option<u16>,

    /// Directory holding the session records
    #[arg(long)]
    data_dir: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let args = Args::parse();

    let mut config = ServerConfig::load_or_default(&args.config);
    if let Some(port) = args.port {
        config.port = port;
    }
    if let Some(data_dir) = args.data_dir {
        config.data_dir = data_dir;
    }

    let store = JsonFileStore::new(&config.data_dir);
    log_info(&format!("Session records in {}", store.dir().display()));
    let registry = SessionRegistry::new(Arc::new(store));
    let loaded = registry.load_all()?;
    log_info(&format!("Loaded {loaded} sessions"));

    let state = Arc::new(AppState { registry, config });
    let (server_handle, shutdown_signal) = start_server(state);

    if let Err(e) = tokio::signal::ctrl_c().await {
        log_error(&format!("Could not listen for shutdown signal: {e}"));
    }

    shutdown_signal.store(true, Ordering::Relaxed);
    if let Err(e) = server_handle.await {
        log_error(&format!("Error waiting for server shutdown: {e:?}"));
    }
    log_info("Draw server stopped.");

    Ok(())
}
