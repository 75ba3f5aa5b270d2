//! BackgroundWorker - runs long operations off the caller's path
//!
//! Each operation is spawned onto the tokio runtime and handed back as a
//! [`JoinHandle`]; callers await it (or not) and re-query state afterward.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::error::PluginHostError;
use crate::manager::PluginManager;

pub struct BackgroundWorker {
    manager: Arc<PluginManager>,
    shutdown: CancellationToken,
}

impl BackgroundWorker {
    pub fn new(manager: Arc<PluginManager>) -> Self {
        Self {
            manager,
            shutdown: CancellationToken::new(),
        }
    }

    /// Refresh the update catalog
    pub fn refresh(&self) -> JoinHandle<Result<usize, PluginHostError>> {
        let manager = Arc::clone(&self.manager);
        tokio::spawn(async move { manager.catalog().refresh().await })
    }

    /// Stop, unload, reload and restart every module
    pub fn reload(&self) -> JoinHandle<Result<(), PluginHostError>> {
        let manager = Arc::clone(&self.manager);
        tokio::spawn(async move { manager.reload().await })
    }

    /// Apply the best available update for one module
    pub fn apply(&self, id: &str) -> JoinHandle<Result<bool, PluginHostError>> {
        let manager = Arc::clone(&self.manager);
        let id = id.to_string();
        tokio::spawn(async move { manager.update(&id).await })
    }

    /// Apply every available update
    pub fn update_all(&self) -> JoinHandle<Result<bool, PluginHostError>> {
        let manager = Arc::clone(&self.manager);
        tokio::spawn(async move { manager.update_all().await })
    }

    /// Refresh the catalog every `interval` until shutdown
    ///
    /// The first refresh happens one interval from now.
    pub fn schedule_refresh(&self, interval: Duration) -> JoinHandle<()> {
        let manager = Arc::clone(&self.manager);
        let shutdown = self.shutdown.clone();

        tokio::spawn(async move {
            let start = tokio::time::Instant::now() + interval;
            let mut ticker = tokio::time::interval_at(start, interval);
            tracing::debug!(interval_secs = interval.as_secs(), "Scheduled catalog refresh");

            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => {
                        tracing::debug!("Scheduled refresh stopped");
                        break;
                    }
                    _ = ticker.tick() => {
                        if let Err(e) = manager.catalog().refresh().await {
                            tracing::warn!(error = %e, "Scheduled catalog refresh failed");
                        }
                    }
                }
            }
        })
    }

    /// Token cancelled by [`BackgroundWorker::shutdown`]
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Stop scheduled work
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }
}
