use modhost_core::PluginSettings;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Configuration as stored in TOML files (with optional fields for merging)
#[derive(Debug, Clone, Deserialize, Default)]
pub struct RawModhostConfig {
    #[serde(default)]
    pub plugins: RawPluginSection,
}

/// Plugin options as stored in TOML (optional fields for proper merging)
#[derive(Debug, Clone, Deserialize, Default)]
pub struct RawPluginSection {
    pub home_dir: Option<PathBuf>,
    pub tmp_dir: Option<PathBuf>,
    pub autoload: Option<bool>,
    pub version_check: Option<bool>,
    pub exact_version: Option<bool>,
    pub dummy: Option<bool>,
    pub host_version: Option<String>,
    pub refresh_interval_secs: Option<u64>,
}

/// Final configuration with defaults applied
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ModhostConfig {
    #[serde(default)]
    pub plugins: PluginSettings,
}
