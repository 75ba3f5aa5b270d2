//! ConfigStore - module-scoped key/value settings
//!
//! Values are stored in their string form. Keys are namespaced by
//! convention as `"<module-id>.<name>"`; [`ConfigStore::scoped`] applies the
//! prefix for callers that work on behalf of one module.

use std::collections::BTreeMap;
use std::fmt::Display;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::{PoisonError, RwLock};

use crate::error::PluginHostError;

/// Key/value store persisted as a flat TOML table
#[derive(Debug, Default)]
pub struct ConfigStore {
    /// Backing file; `None` keeps values in memory only
    path: Option<PathBuf>,
    values: RwLock<BTreeMap<String, String>>,
}

impl ConfigStore {
    /// Open a store backed by `path`, reading existing values if present
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, PluginHostError> {
        let path = path.into();
        let values = if path.exists() {
            let content = std::fs::read_to_string(&path)?;
            toml::from_str(&content).map_err(|e| PluginHostError::Persistence(e.to_string()))?
        } else {
            BTreeMap::new()
        };
        Ok(Self {
            path: Some(path),
            values: RwLock::new(values),
        })
    }

    /// A store that never touches disk
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Backing file, if any
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Create or overwrite `key` with the string form of `value`
    pub fn set(&self, key: &str, value: impl Display) -> Result<(), PluginHostError> {
        let mut values = self.values.write().unwrap_or_else(PoisonError::into_inner);
        let previous = values.insert(key.to_string(), value.to_string());
        if let Err(e) = self.persist(&values) {
            // Keep memory and disk in agreement
            match previous {
                Some(old) => values.insert(key.to_string(), old),
                None => values.remove(key),
            };
            return Err(e);
        }
        tracing::debug!(key, "Config value stored");
        Ok(())
    }

    /// Stored value for `key`, or `default` when absent
    pub fn get(&self, key: &str, default: &str) -> String {
        self.value(key).unwrap_or_else(|| default.to_string())
    }

    /// Stored value for `key`, if any
    pub fn value(&self, key: &str) -> Option<String> {
        self.values
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    /// Stored value parsed as `T`, or `default` when absent or unparsable
    pub fn get_parsed<T: FromStr>(&self, key: &str, default: T) -> T {
        self.value(key)
            .and_then(|raw| raw.parse().ok())
            .unwrap_or(default)
    }

    /// Remove `key`; returns true if it was present
    pub fn remove(&self, key: &str) -> Result<bool, PluginHostError> {
        let mut values = self.values.write().unwrap_or_else(PoisonError::into_inner);
        let Some(old) = values.remove(key) else {
            return Ok(false);
        };
        if let Err(e) = self.persist(&values) {
            values.insert(key.to_string(), old);
            return Err(e);
        }
        Ok(true)
    }

    /// All entries whose key starts with `prefix`, ordered by key
    pub fn entries(&self, prefix: &str) -> Vec<(String, String)> {
        self.values
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|(key, _)| key.starts_with(prefix))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect()
    }

    /// View of the store that prefixes keys with `"<module_id>."`
    pub fn scoped<'a>(&'a self, module_id: &str) -> ScopedConfig<'a> {
        ScopedConfig {
            store: self,
            prefix: format!("{module_id}."),
        }
    }

    fn persist(&self, values: &BTreeMap<String, String>) -> Result<(), PluginHostError> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let content =
            toml::to_string(values).map_err(|e| PluginHostError::Persistence(e.to_string()))?;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty() && !p.exists()) {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, content)?;
        Ok(())
    }
}

/// Config access on behalf of one module
pub struct ScopedConfig<'a> {
    store: &'a ConfigStore,
    prefix: String,
}

impl ScopedConfig<'_> {
    fn key(&self, name: &str) -> String {
        format!("{}{}", self.prefix, name)
    }

    pub fn get(&self, name: &str, default: &str) -> String {
        self.store.get(&self.key(name), default)
    }

    pub fn get_parsed<T: FromStr>(&self, name: &str, default: T) -> T {
        self.store.get_parsed(&self.key(name), default)
    }

    pub fn set(&self, name: &str, value: impl Display) -> Result<(), PluginHostError> {
        self.store.set(&self.key(name), value)
    }
}
