use anyhow::Result;
use clap::{Args, Subcommand};
use modhost_core::ConfigStore;

use super::{HostOverrides, load_settings};
use crate::config::{ConfigLoader, ModhostConfig};

#[derive(Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommands,
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Show current configuration (merged)
    Show,
    /// Show configuration file paths
    Path,
    /// Read a module config value
    Get {
        key: String,
        /// Printed when the key is absent
        #[arg(long, default_value = "")]
        default: String,
    },
    /// Store a module config value
    Set { key: String, value: String },
    /// List module config values under a prefix
    List {
        #[arg(default_value = "")]
        prefix: String,
    },
}

pub fn run(args: ConfigArgs, overrides: &HostOverrides) -> Result<()> {
    match args.command {
        ConfigCommands::Show => show_config(overrides),
        ConfigCommands::Path => show_paths(),
        ConfigCommands::Get { key, default } => {
            println!("{}", open_store()?.get(&key, &default));
            Ok(())
        }
        ConfigCommands::Set { key, value } => {
            open_store()?.set(&key, &value)?;
            println!("{key} = {value}");
            Ok(())
        }
        ConfigCommands::List { prefix } => {
            for (key, value) in open_store()?.entries(&prefix) {
                println!("{key} = {value}");
            }
            Ok(())
        }
    }
}

fn open_store() -> Result<ConfigStore> {
    Ok(ConfigStore::open(modhost_paths::plugin_data_file())?)
}

fn show_config(overrides: &HostOverrides) -> Result<()> {
    let config = ModhostConfig {
        plugins: load_settings(overrides)?,
    };
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{}", toml_str);
    Ok(())
}

fn show_paths() -> Result<()> {
    println!("User config:    {:?}", ConfigLoader::user_config_path());
    println!("Project config: {:?}", ConfigLoader::project_config_path());
    println!("Module config:  {:?}", modhost_paths::plugin_data_file());
    println!("Repositories:   {:?}", modhost_paths::repositories_file());
    Ok(())
}
