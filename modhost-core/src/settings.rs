//! Recognized plugin-host options

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Host version reported when the real one is unknown
///
/// A host running as `0.0.0` does not enforce module version constraints.
pub const UNKNOWN_HOST_VERSION: &str = "0.0.0";

/// Options controlling where modules live and how they are admitted
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PluginSettings {
    /// Committed module archives
    pub home_dir: PathBuf,
    /// Staging area for uploads and downloads
    pub tmp_dir: PathBuf,
    /// Scan and start all modules on startup
    pub autoload: bool,
    /// Enforce `requires` constraints and offer only compatible updates
    pub version_check: bool,
    /// Treat a bare constraint version as exact rather than minimum
    pub exact_version: bool,
    /// Show synthetic modules in listings
    pub dummy: bool,
    /// Version of the running host
    pub host_version: String,
    /// Seconds between scheduled catalog refreshes (0 = off)
    pub refresh_interval_secs: u64,
}

impl Default for PluginSettings {
    fn default() -> Self {
        Self {
            home_dir: PathBuf::from("./plugins/"),
            tmp_dir: PathBuf::from("./tmp/"),
            autoload: true,
            version_check: true,
            exact_version: false,
            dummy: false,
            host_version: UNKNOWN_HOST_VERSION.to_string(),
            refresh_interval_secs: 3600,
        }
    }
}

impl PluginSettings {
    /// Host version to check constraints against, if enforcement is on
    pub fn enforced_host_version(&self) -> Option<&str> {
        let host = self.host_version.trim();
        (self.version_check && !host.is_empty() && host != UNKNOWN_HOST_VERSION).then_some(host)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = PluginSettings::default();
        assert_eq!(settings.home_dir, PathBuf::from("./plugins/"));
        assert_eq!(settings.tmp_dir, PathBuf::from("./tmp/"));
        assert!(settings.autoload);
        assert!(settings.version_check);
        assert!(!settings.exact_version);
        assert!(!settings.dummy);
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let settings: PluginSettings = toml::from_str(
            r#"
            home_dir = "/srv/modules"
            exact_version = true
            "#,
        )
        .unwrap();
        assert_eq!(settings.home_dir, PathBuf::from("/srv/modules"));
        assert!(settings.exact_version);
        assert!(settings.autoload);
        assert_eq!(settings.refresh_interval_secs, 3600);
    }

    #[test]
    fn test_enforced_host_version() {
        let mut settings = PluginSettings::default();
        assert_eq!(settings.enforced_host_version(), None);

        settings.host_version = "2.1.0".into();
        assert_eq!(settings.enforced_host_version(), Some("2.1.0"));

        settings.version_check = false;
        assert_eq!(settings.enforced_host_version(), None);
    }
}
