use super::types::{ModhostConfig, RawModhostConfig, RawPluginSection};
use anyhow::Result;
use modhost_core::PluginSettings;
use std::path::{Path, PathBuf};

pub struct ConfigLoader;

impl ConfigLoader {
    /// Load merged configuration (user + project)
    pub fn load() -> Result<ModhostConfig> {
        Self::load_from(&Self::user_config_path(), &Self::project_config_path())
    }

    /// Load and merge the given user and project config files
    pub fn load_from(user_path: &Path, project_path: &Path) -> Result<ModhostConfig> {
        let mut raw = RawModhostConfig::default();

        // Layer 1: User config
        if user_path.exists() {
            raw = Self::merge_raw(raw, Self::read(user_path)?);
        }

        // Layer 2: Project config
        if project_path.exists() {
            raw = Self::merge_raw(raw, Self::read(project_path)?);
        }

        Ok(Self::finalize(raw))
    }

    fn read(path: &Path) -> Result<RawModhostConfig> {
        let contents = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&contents)?)
    }

    /// User config path (`~/.config/modhost/config.toml`)
    pub fn user_config_path() -> PathBuf {
        modhost_paths::config_dir().join("config.toml")
    }

    /// Get project config path
    /// Can be overridden with MODHOST_PROJECT_CONFIG_DIR env var (useful for isolated tests)
    pub fn project_config_path() -> PathBuf {
        if let Ok(dir) = std::env::var("MODHOST_PROJECT_CONFIG_DIR") {
            PathBuf::from(dir).join("config.toml")
        } else {
            PathBuf::from(".modhost/config.toml")
        }
    }

    /// Merge two raw configs (overlay values override base only if explicitly set)
    fn merge_raw(base: RawModhostConfig, overlay: RawModhostConfig) -> RawModhostConfig {
        let (base, overlay) = (base.plugins, overlay.plugins);
        RawModhostConfig {
            plugins: RawPluginSection {
                home_dir: overlay.home_dir.or(base.home_dir),
                tmp_dir: overlay.tmp_dir.or(base.tmp_dir),
                autoload: overlay.autoload.or(base.autoload),
                version_check: overlay.version_check.or(base.version_check),
                exact_version: overlay.exact_version.or(base.exact_version),
                dummy: overlay.dummy.or(base.dummy),
                host_version: overlay.host_version.or(base.host_version),
                refresh_interval_secs: overlay
                    .refresh_interval_secs
                    .or(base.refresh_interval_secs),
            },
        }
    }

    /// Convert raw config to final config with defaults applied
    fn finalize(raw: RawModhostConfig) -> ModhostConfig {
        let defaults = PluginSettings::default();
        let plugins = raw.plugins;
        ModhostConfig {
            plugins: PluginSettings {
                home_dir: plugins.home_dir.unwrap_or(defaults.home_dir),
                tmp_dir: plugins.tmp_dir.unwrap_or(defaults.tmp_dir),
                autoload: plugins.autoload.unwrap_or(defaults.autoload),
                version_check: plugins.version_check.unwrap_or(defaults.version_check),
                exact_version: plugins.exact_version.unwrap_or(defaults.exact_version),
                dummy: plugins.dummy.unwrap_or(defaults.dummy),
                host_version: plugins.host_version.unwrap_or(defaults.host_version),
                refresh_interval_secs: plugins
                    .refresh_interval_secs
                    .unwrap_or(defaults.refresh_interval_secs),
            },
        }
    }

    /// Save config to a specific path
    ///
    /// Creates parent directories if they don't exist.
    pub fn save_to_path(config: &ModhostConfig, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let toml = toml::to_string_pretty(config)?;
        std::fs::write(path, toml)?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use tempfile::TempDir;

    fn write(path: &Path, contents: &str) {
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, contents).unwrap();
    }

    #[test]
    fn test_load_without_files_uses_defaults() {
        let dir = TempDir::new().unwrap();
        let config = ConfigLoader::load_from(
            &dir.path().join("user/config.toml"),
            &dir.path().join("project/config.toml"),
        )
        .unwrap();
        assert_eq!(config.plugins, PluginSettings::default());
    }

    #[test]
    fn test_project_overrides_user_only_when_set() {
        let dir = TempDir::new().unwrap();
        let user = dir.path().join("user/config.toml");
        let project = dir.path().join("project/config.toml");
        write(
            &user,
            r#"
[plugins]
home_dir = "/srv/modules"
autoload = false
host_version = "1.2.0"
"#,
        );
        write(
            &project,
            r#"
[plugins]
host_version = "2.0.0"
"#,
        );

        let config = ConfigLoader::load_from(&user, &project).unwrap();
        assert_eq!(config.plugins.home_dir, PathBuf::from("/srv/modules"));
        assert!(!config.plugins.autoload);
        assert_eq!(config.plugins.host_version, "2.0.0");
        assert_eq!(config.plugins.tmp_dir, PathBuf::from("./tmp/"));
    }

    #[test]
    fn test_save_and_reload() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested/config.toml");
        let mut config = ModhostConfig::default();
        config.plugins.dummy = true;

        ConfigLoader::save_to_path(&config, &path).unwrap();
        let loaded = ConfigLoader::load_from(&dir.path().join("none.toml"), &path).unwrap();
        assert!(loaded.plugins.dummy);
    }

    #[test]
    #[serial]
    fn test_project_config_path_env_override() {
        // SAFETY: serialized with the other env-touching tests
        unsafe { std::env::set_var("MODHOST_PROJECT_CONFIG_DIR", "/tmp/modhost-test") };
        assert_eq!(
            ConfigLoader::project_config_path(),
            PathBuf::from("/tmp/modhost-test/config.toml")
        );
        unsafe { std::env::remove_var("MODHOST_PROJECT_CONFIG_DIR") };
        assert_eq!(
            ConfigLoader::project_config_path(),
            PathBuf::from(".modhost/config.toml")
        );
    }
}
