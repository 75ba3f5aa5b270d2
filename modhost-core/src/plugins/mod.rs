//! Module lifecycle for modhost
//!
//! - [`PluginRegistry`]: owns loaded modules and their lifecycle state
//! - [`StagingInstaller`]: temp-write, trial-load, commit-or-discard installs
//! - [`ExtensionRegistry`]: capability instances registered by started modules
//! - [`ModuleLoader`]: turns an archive into an [`IsolationBoundary`]
//!
//! # Home Directory
//!
//! Committed archives live directly in the home directory (default
//! `./plugins/`), one file per module, next to `disabled.toml`, the persisted
//! list of disabled module ids. Uploads pass through the temp directory
//! (default `./tmp/`) first.

mod disabled;
mod extensions;
mod installer;
mod loader;
mod registry;
mod state;

#[cfg(test)]
pub(crate) mod testing;

pub use disabled::{DISABLED_FILE, DisabledPlugins};
pub use extensions::ExtensionRegistry;
pub use installer::{StagedArchive, StagingInstaller};
pub use loader::{DylibLoader, IsolationBoundary, ModuleLoader};
pub use registry::PluginRegistry;
pub use state::{FailureCause, ModuleDescriptor, PluginInfo, PluginState};
