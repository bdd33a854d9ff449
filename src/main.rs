// Copyright © 2025 rustmailer.com
// Licensed under RustMailer License Agreement v1.0
// Unauthorized copying, modification, or distribution is prohibited.

use issueforge::modules::{
    common::{rustls::EngineTls, signal::SignalManager},
    context::{EngineTask, Initialize},
    database::{backup::MetaBackupTask, manager::DatabaseManager, snapshot::DatabaseSnapshotTask},
    error::EngineResult,
    logger,
    scheduler::Scheduler,
    settings::{dir::DataDirManager, SETTINGS},
    taskqueue::queue::EngineTaskQueue,
    utils::shutdown::shutdown_signal,
};
use mimalloc::MiMalloc;
use tracing::{error, info};

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

static LOGO: &str = r#"
  _                       __
 (_)____________  _____  / _|___  _________ ____
/ / ___/ ___/ / / / _ \/ /_/ _ \/ ___/ __ `/ _ \
/ (__  |__  ) /_/ /  __/ __/  __/ /  / /_/ /  __/
/_/____/____/\__,_/\___/_/  \___/_/   \__, /\___/
                                      /____/
"#;

#[tokio::main]
async fn main() -> EngineResult<()> {
    logger::initialize_logging();
    info!("{}", LOGO);
    info!("Starting issueforge");
    info!("Version:  {}", env!("CARGO_PKG_VERSION"));
    info!("Git:      [{}]", env!("GIT_HASH"));

    if let Err(error) = initialize().await {
        eprintln!("{:?}", error);
        return Err(error);
    }

    shutdown_signal().await;
    info!("shutdown signal received, stopping");
    snapshot_after_shutdown_if_needed().await;
    Ok(())
}

/// Brings up every process-wide singleton in dependency order, then starts
/// the background subsystems that run for the life of the process: the
/// workflow/fetch task queue and the five scheduler sweeps (spec §4.6).
async fn initialize() -> EngineResult<()> {
    SignalManager::initialize().await?;
    DataDirManager::initialize().await?;
    EngineTls::initialize().await?;
    DatabaseManager::initialize().await?;
    EngineTaskQueue::initialize().await?;

    Scheduler::start();
    DatabaseSnapshotTask::start();
    MetaBackupTask::start();
    Ok(())
}

async fn snapshot_after_shutdown_if_needed() {
    if SETTINGS.memory_mode_enabled {
        info!("All background tasks stopped. Starting snapshot...");
        if let Err(e) = DatabaseSnapshotTask::block_snapshot().await {
            error!("Snapshot after shutdown failed: {:?}", e);
        } else {
            info!("Snapshot after shutdown completed.");
        }
    }
}
