//! Persisted set of disabled modules
//!
//! Stored as TOML next to the archives (`<home>/disabled.toml`) so a module
//! disabled by an operator stays DISABLED across host restarts.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::Path;

use crate::error::PluginHostError;

/// File name of the disabled list inside the home directory
pub const DISABLED_FILE: &str = "disabled.toml";

/// Set of disabled module ids
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct DisabledPlugins {
    /// Disabled module ids
    #[serde(default)]
    pub disabled: BTreeSet<String>,
}

impl DisabledPlugins {
    /// Load the list from a TOML file
    ///
    /// Returns an empty list if the file doesn't exist.
    pub fn load(path: &Path) -> Result<Self, PluginHostError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| PluginHostError::Persistence(e.to_string()))
    }

    /// Save the list to a TOML file
    pub fn save(&self, path: &Path) -> Result<(), PluginHostError> {
        let content =
            toml::to_string_pretty(self).map_err(|e| PluginHostError::Persistence(e.to_string()))?;

        if let Some(parent) = path.parent().filter(|p| !p.exists()) {
            std::fs::create_dir_all(parent)?;
        }

        std::fs::write(path, content)?;
        Ok(())
    }

    /// Check if a module is disabled
    pub fn contains(&self, id: &str) -> bool {
        self.disabled.contains(id)
    }

    /// Mark a module disabled; returns true if the set changed
    pub fn insert(&mut self, id: &str) -> bool {
        self.disabled.insert(id.to_string())
    }

    /// Clear a module's disabled mark; returns true if the set changed
    pub fn remove(&mut self, id: &str) -> bool {
        self.disabled.remove(id)
    }
}
