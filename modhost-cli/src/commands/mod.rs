//! CLI subcommands and the shared host builder

pub mod config;
pub mod plugin;
pub mod repo;
pub mod run;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use modhost_core::{ConfigStore, PluginManager, PluginSettings, TomlRepositoryStore};

use crate::config::ConfigLoader;

/// Directory overrides given on the command line
#[derive(Debug, Default, Clone)]
pub struct HostOverrides {
    pub home: Option<PathBuf>,
    pub tmp: Option<PathBuf>,
}

impl HostOverrides {
    /// Apply the overrides on top of file-based settings
    pub fn apply(&self, mut settings: PluginSettings) -> PluginSettings {
        if let Some(home) = &self.home {
            settings.home_dir = home.clone();
        }
        if let Some(tmp) = &self.tmp {
            settings.tmp_dir = tmp.clone();
        }
        settings
    }
}

/// Merged settings with command-line overrides applied
pub fn load_settings(overrides: &HostOverrides) -> Result<PluginSettings> {
    let config = ConfigLoader::load()?;
    Ok(overrides.apply(config.plugins))
}

/// Build a manager backed by the XDG config store and repository list
pub fn build_manager(overrides: &HostOverrides) -> Result<Arc<PluginManager>> {
    let settings = load_settings(overrides)?;
    let store_path = modhost_paths::plugin_data_file();
    let config = ConfigStore::open(&store_path)
        .with_context(|| format!("Failed to open config store at {}", store_path.display()))?;
    let repositories = TomlRepositoryStore::new(modhost_paths::repositories_file());

    let manager = PluginManager::builder(settings, Arc::new(config), Arc::new(repositories))
        .build()
        .context("Failed to create plugin manager")?;
    Ok(Arc::new(manager))
}

/// Open a manager, load modules, and stop them again after `f`
pub async fn with_started_host<F, Fut, T>(overrides: &HostOverrides, f: F) -> Result<T>
where
    F: FnOnce(Arc<PluginManager>) -> Fut,
    Fut: std::future::Future<Output = Result<T>>,
{
    let manager = build_manager(overrides)?;
    manager.startup()?;
    let result = f(manager.clone()).await;
    manager.shutdown();
    result
}
