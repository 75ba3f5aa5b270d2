//! modhost-core: Core library for the modhost plugin host
//!
//! This crate provides the machinery for running dynamically loadable
//! modules inside a host application:
//!
//! - **Plugin registry** - [`PluginRegistry`] owns loaded modules and is the
//!   only place their lifecycle state changes
//! - **Version resolver** - [`VersionResolver`] evaluates host-version
//!   constraints at load and update time
//! - **Staging installer** - [`StagingInstaller`] writes uploads to a temp
//!   area, trial-loads them and only then commits them to the home directory
//! - **Update catalog** - [`UpdateCatalog`] aggregates remote repositories
//!   and selects applicable releases
//! - **Extension registry** - [`ExtensionRegistry`] maps capability types to
//!   the instances started modules registered for them
//! - **Config store** - [`ConfigStore`] module-scoped key/value settings
//!
//! # Quick Start
//!
//! ```no_run
//! use modhost_core::{ConfigStore, PluginManager, PluginSettings, TomlRepositoryStore};
//! use std::sync::Arc;
//!
//! fn example() -> Result<(), Box<dyn std::error::Error>> {
//!     let settings = PluginSettings::default();
//!     let config = Arc::new(ConfigStore::open("plugin-data.toml")?);
//!     let repositories = Arc::new(TomlRepositoryStore::new("repositories.toml"));
//!
//!     let manager = PluginManager::builder(settings, config, repositories).build()?;
//!     manager.startup()?;
//!
//!     for info in manager.registry().plugins() {
//!         println!("{} {} {}", info.descriptor.id, info.descriptor.version, info.state);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                        PluginManager                         │
//! │  ┌───────────────┐   ┌──────────────────┐   ┌──────────────┐ │
//! │  │ UpdateCatalog │──▶│ StagingInstaller │──▶│PluginRegistry│ │
//! │  │(repositories) │   │  (tmp -> home)   │   │ (lifecycle)  │ │
//! │  └───────────────┘   └──────────────────┘   └──────┬───────┘ │
//! │                         VersionResolver ◀──────────┤         │
//! │                       ExtensionRegistry ◀──────────┘         │
//! └──────────────────────────────────────────────────────────────┘
//! ```

pub mod config_store;
pub mod demo;
pub mod error;
pub mod manager;
pub mod plugins;
pub mod services;
pub mod settings;
pub mod update;
pub mod version;
pub mod worker;

// Re-export key types for convenience
pub use config_store::{ConfigStore, ScopedConfig};
pub use error::PluginHostError;
pub use manager::{AllowAll, PluginManager, PluginManagerBuilder, Permissions};
pub use plugins::{
    DylibLoader, ExtensionRegistry, FailureCause, IsolationBoundary, ModuleDescriptor,
    ModuleLoader, PluginInfo, PluginRegistry, PluginState, StagedArchive, StagingInstaller,
};
pub use services::HostContext;
pub use settings::PluginSettings;
pub use update::{
    HttpReleaseSource, MemoryRepositoryStore, Release, ReleaseSource, Repository, RepositoryStore,
    TomlRepositoryStore, UpdateCatalog,
};
pub use version::VersionResolver;
pub use worker::BackgroundWorker;
