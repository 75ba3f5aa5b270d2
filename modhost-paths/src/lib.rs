//! XDG Base Directory paths for modhost.
//!
//! The host keeps its own files (layered config, repository list, module
//! config store) under XDG paths. Module archives live in the configurable
//! home directory instead, which defaults to `./plugins/`.

use std::path::PathBuf;

/// Get the modhost config directory.
///
/// Returns `$XDG_CONFIG_HOME/modhost` if set, otherwise `~/.config/modhost`.
/// The user config file and the repository list are stored here.
///
/// # Examples
///
/// ```
/// use modhost_paths::config_dir;
///
/// let repositories = config_dir().join("repositories.toml");
/// ```
pub fn config_dir() -> PathBuf {
    if let Ok(xdg_config) = std::env::var("XDG_CONFIG_HOME") {
        PathBuf::from(xdg_config).join("modhost")
    } else if let Some(home) = dirs::home_dir() {
        home.join(".config/modhost")
    } else {
        PathBuf::from(".config/modhost")
    }
}

/// Get the modhost data directory.
///
/// Returns `$XDG_DATA_HOME/modhost` if set, otherwise `~/.local/share/modhost`.
/// Module key/value settings are persisted here.
pub fn data_dir() -> PathBuf {
    if let Ok(xdg_data) = std::env::var("XDG_DATA_HOME") {
        PathBuf::from(xdg_data).join("modhost")
    } else if let Some(home) = dirs::home_dir() {
        home.join(".local/share/modhost")
    } else {
        PathBuf::from(".local/share/modhost")
    }
}

/// Path of the repository list inside [`config_dir`].
pub fn repositories_file() -> PathBuf {
    config_dir().join("repositories.toml")
}

/// Path of the module config store inside [`data_dir`].
pub fn plugin_data_file() -> PathBuf {
    data_dir().join("plugin-data.toml")
}
