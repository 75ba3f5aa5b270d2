//! Host services injected into modules at start time

use std::sync::Arc;

use modhost_plugin_api::{HostServices, PluginError};

use crate::config_store::ConfigStore;

/// The host's [`HostServices`]: host version and config store access
pub struct HostContext {
    host_version: String,
    config: Arc<ConfigStore>,
}

impl HostContext {
    pub fn new(host_version: impl Into<String>, config: Arc<ConfigStore>) -> Self {
        Self {
            host_version: host_version.into(),
            config,
        }
    }
}

impl HostServices for HostContext {
    fn host_version(&self) -> String {
        self.host_version.clone()
    }

    fn config_value(&self, key: &str) -> Option<String> {
        self.config.value(key)
    }

    fn set_config_value(&self, key: &str, value: &str) -> Result<(), PluginError> {
        self.config
            .set(key, value)
            .map_err(|e| PluginError::config(e.to_string()))
    }
}
