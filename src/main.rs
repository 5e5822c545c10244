//! wavesync 命令行入口
//!
//! `wavesync [config.json]` runs the engine until Ctrl-C.

use anyhow::Context;
use tracing::{error, info, warn};

use wavesync::config::{ConfigStore, SyncSettings};
use wavesync::sync::StopOutcome;
use wavesync::utils::{init_logging, AppResult};
use wavesync::SyncEngine;

#[tokio::main]
async fn main() -> AppResult<()> {
    init_logging()?;

    let store = match std::env::args().nth(1) {
        Some(path) => ConfigStore::load(&path).await?,
        None => ConfigStore::load_default().await?,
    };
    let settings = SyncSettings::from_store(&store).context("Invalid configuration")?;

    let engine = SyncEngine::new(settings);
    if let Err(e) = engine.start().await {
        error!("Failed to start: {}", e);
        return Err(e).context("Sync engine failed to start");
    }

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")?;
    info!("Shutdown requested");

    match engine.stop().await.context("Failed to stop sync engine")? {
        StopOutcome::Graceful => info!("Bye"),
        StopOutcome::Forced => warn!("Sync loop had to be aborted"),
    }
    Ok(())
}
