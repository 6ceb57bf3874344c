use anyhow::Result;
use clap::Parser;
use tokio::signal;
use log::{info, warn};

mod importer;
mod ipc;
mod settings_store;
mod storage;

use ipc::{start_ipc_server, AgentState};
use storage::Storage;
use common::Config;

#[derive(Parser)]
#[command(name = "sid-agent")]
#[command(about = "Shadow IT discovery agent: inventory, risk and scoring over a local socket")]
struct Args {
    /// Config file (defaults to $SID_CONFIG, then ./config/default.toml)
    #[arg(long)]
    config: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    info!("Starting SID agent");

    // Load configuration
    let config_path = Config::resolve_path(args.config.as_deref());
    let config = Config::load(&config_path)?;
    info!("Config loaded from {}", config_path);

    // Initialize storage
    let storage = Storage::new(&config.storage.db_path).await?;
    info!("Storage initialized at {}", config.storage.db_path);

    // Startup imports are best effort; the socket accepts them later too
    if let Some(path) = &config.ingest.applications_path {
        if let Err(e) = importer::import_scan(&storage, path).await {
            warn!("Startup scan import from {} failed: {:#}", path, e);
        }
    }
    if let Some(path) = &config.ingest.rubric_path {
        if let Err(e) = importer::import_rubric(&storage, path, config.ingest.match_threshold).await {
            warn!("Startup rubric import from {} failed: {:#}", path, e);
        }
    }

    // Start IPC server
    let state = AgentState { storage, ingest: config.ingest.clone() };
    start_ipc_server(state, config.ipc.socket_path.clone()).await?;
    info!("IPC server started on {}", config.ipc.socket_path);

    info!("SID agent is running");

    // Wait for ctrl-c
    signal::ctrl_c().await?;
    info!("Shutting down");
    let _ = std::fs::remove_file(&config.ipc.socket_path);
    Ok(())
}
