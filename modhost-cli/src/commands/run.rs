//! Long-running host: load modules, refresh the catalog on a schedule

use std::time::Duration;

use anyhow::Result;
use clap::Args;
use modhost_core::BackgroundWorker;

use super::{HostOverrides, build_manager};

#[derive(Args)]
pub struct RunArgs {
    /// Seconds between catalog refreshes (overrides the configured interval, 0 = off)
    #[arg(long)]
    refresh_interval: Option<u64>,
}

pub async fn run(args: RunArgs, overrides: &HostOverrides) -> Result<()> {
    let manager = build_manager(overrides)?;
    let loaded = manager.startup()?;
    tracing::info!(count = loaded.len(), home = %manager.settings().home_dir.display(), "Host started");

    let worker = BackgroundWorker::new(manager.clone());
    match worker.refresh().await? {
        Ok(count) => tracing::info!(modules = count, "Catalog refreshed"),
        Err(e) => tracing::warn!(error = %e, "Initial catalog refresh failed"),
    }

    let interval = args
        .refresh_interval
        .unwrap_or(manager.settings().refresh_interval_secs);
    let scheduled = (interval > 0).then(|| worker.schedule_refresh(Duration::from_secs(interval)));

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutting down");

    worker.shutdown();
    if let Some(handle) = scheduled {
        let _ = handle.await;
    }
    manager.shutdown();
    Ok(())
}
