//! Plugin management commands

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::{Args, Subcommand};
use comfy_table::{Cell, Color, ContentArrangement, Table, presets::UTF8_FULL_CONDENSED};
use modhost_core::{PluginInfo, PluginState};

use super::{HostOverrides, with_started_host};

/// Plugin management arguments
#[derive(Args)]
pub struct PluginArgs {
    #[command(subcommand)]
    pub command: PluginCommands,
}

/// Plugin subcommands
#[derive(Subcommand)]
pub enum PluginCommands {
    /// List loaded plugins
    List,
    /// Show plugin details
    Info {
        /// Plugin id
        id: String,
    },
    /// Start a plugin
    Start { id: String },
    /// Stop a plugin
    Stop { id: String },
    /// Enable a plugin
    Enable { id: String },
    /// Disable a plugin
    Disable { id: String },
    /// Install a plugin archive and start it
    Install {
        /// Archive to install
        file: PathBuf,
    },
    /// Unload a plugin and delete its archive
    Delete { id: String },
    /// Copy a plugin's archive to a file
    Export {
        id: String,
        /// Destination file
        dest: PathBuf,
    },
    /// List plugins with a newer compatible release
    Outdated,
    /// Apply available updates
    Update {
        /// Update only this plugin
        id: Option<String>,
    },
    /// Reload every plugin from the home directory
    Reload,
    /// Show or edit a plugin's settings
    Settings {
        id: String,
        /// Value to save, as `name=value` (repeatable)
        #[arg(long = "set", value_parser = parse_assignment)]
        values: Vec<(String, String)>,
    },
}

fn parse_assignment(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((name, value)) if !name.trim().is_empty() => {
            Ok((name.trim().to_string(), value.to_string()))
        }
        _ => Err(format!("expected name=value, got '{s}'")),
    }
}

/// Run plugin command
pub async fn run(args: PluginArgs, overrides: &HostOverrides) -> Result<()> {
    with_started_host(overrides, |manager| async move {
        match args.command {
            PluginCommands::List => {
                print_plugins(&manager.display_plugins(), manager.settings().home_dir.as_path());
            }
            PluginCommands::Info { id } => {
                let Some(info) = manager.registry().plugin(&id) else {
                    bail!("Plugin not found: {id}");
                };
                print_info(&info);
            }
            PluginCommands::Start { id } => {
                let state = manager.start(&id)?;
                println!("{id}: {state}");
            }
            PluginCommands::Stop { id } => {
                let state = manager.stop(&id)?;
                println!("{id}: {state}");
            }
            PluginCommands::Enable { id } => {
                if !manager.enable(&id)? {
                    bail!("Cannot enable plugin: {id}");
                }
                println!("Enabled plugin: {id}");
            }
            PluginCommands::Disable { id } => {
                if !manager.disable(&id)? {
                    bail!("Cannot disable plugin: {id}");
                }
                println!("Disabled plugin: {id}");
            }
            PluginCommands::Install { file } => {
                let name = file
                    .file_name()
                    .and_then(|n| n.to_str())
                    .with_context(|| format!("Not a file: {}", file.display()))?
                    .to_string();
                let bytes = std::fs::read(&file)
                    .with_context(|| format!("Failed to read {}", file.display()))?;
                let id = manager.install(&name, &bytes)?;
                println!("Installed plugin: {id}");
            }
            PluginCommands::Delete { id } => {
                if !manager.delete(&id)? {
                    bail!("Plugin not found: {id}");
                }
                println!("Deleted plugin: {id}");
            }
            PluginCommands::Export { id, dest } => {
                let mut file = std::fs::File::create(&dest)
                    .with_context(|| format!("Failed to create {}", dest.display()))?;
                let written = manager.registry().export_archive(&id, &mut file)?;
                println!("Exported {id} to {} ({written} bytes)", dest.display());
            }
            PluginCommands::Outdated => {
                manager.catalog().refresh().await?;
                let outdated = manager.catalog().list_outdated()?;
                if outdated.is_empty() {
                    println!("All plugins are up to date");
                }
                for release in outdated {
                    let installed = manager
                        .registry()
                        .plugin(&release.module_id)
                        .map(|p| p.descriptor.version)
                        .unwrap_or_default();
                    println!("{} {} -> {}", release.module_id, installed, release.version);
                }
            }
            PluginCommands::Update { id } => {
                manager.catalog().refresh().await?;
                let ok = match id {
                    Some(id) => manager.update(&id).await?,
                    None => manager.update_all().await?,
                };
                if !ok {
                    bail!("One or more updates failed, see log for details");
                }
                println!("Updates applied");
            }
            PluginCommands::Reload => {
                manager.reload().await?;
                println!("Reloaded {} plugin(s)", manager.registry().plugins().len());
            }
            PluginCommands::Settings { id, values } => {
                let Some(panel) = manager.settings_panel(&id) else {
                    bail!("Plugin {id} has no settings (is it started?)");
                };
                if !values.is_empty() {
                    let values: HashMap<String, String> = values.into_iter().collect();
                    panel
                        .save(&values)
                        .with_context(|| format!("Failed to save settings for {id}"))?;
                }
                for field in panel.fields() {
                    println!("{:<24} {:<32} {}", field.name, field.label, field.value);
                }
            }
        }
        Ok(())
    })
    .await
}

fn state_color(state: PluginState) -> Color {
    match state {
        PluginState::Started => Color::Green,
        PluginState::Failed => Color::Red,
        PluginState::Disabled | PluginState::Stopped => Color::Yellow,
        _ => Color::Reset,
    }
}

fn print_plugins(plugins: &[PluginInfo], home: &Path) {
    if plugins.is_empty() {
        println!("No plugins installed");
        println!();
        println!("Plugin directory: {}", home.display());
        println!("Install one with: modhost plugin install <archive>");
        return;
    }

    let mut table = Table::new();
    table.load_preset(UTF8_FULL_CONDENSED);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec![
        Cell::new("Plugin").fg(Color::Cyan),
        Cell::new("Version").fg(Color::Cyan),
        Cell::new("State").fg(Color::Cyan),
        Cell::new("Requires").fg(Color::Cyan),
        Cell::new("Description").fg(Color::Cyan),
    ]);

    for info in plugins {
        let d = &info.descriptor;
        let description = match &info.failure {
            Some(cause) => cause.to_string(),
            None => d.description.clone(),
        };
        table.add_row(vec![
            Cell::new(&d.id),
            Cell::new(&d.version),
            Cell::new(info.state).fg(state_color(info.state)),
            Cell::new(if d.has_constraint() { d.requires.as_str() } else { "*" }),
            Cell::new(description),
        ]);
    }

    println!("{table}");
}

fn or_unknown(value: &str) -> &str {
    if value.is_empty() { "Unknown" } else { value }
}

fn print_info(info: &PluginInfo) {
    let d = &info.descriptor;
    println!("Id:          {}", d.id);
    println!("Version:     {}", d.version);
    println!("State:       {}", info.state);
    println!(
        "Requires:    {}",
        if d.has_constraint() { d.requires.as_str() } else { "*" }
    );
    println!("Provider:    {}", or_unknown(&d.provider));
    println!("License:     {}", or_unknown(&d.license));
    println!("Description: {}", or_unknown(&d.description));
    println!("Archive:     {}", d.path.display());
    if let Some(cause) = &info.failure {
        println!("Failure:     {cause}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Parser)]
    struct Harness {
        #[command(subcommand)]
        command: PluginCommands,
    }

    #[test]
    fn test_parse_settings_assignments() {
        let h = Harness::try_parse_from([
            "t", "settings", "welcome", "--set", "welcome.username=ada", "--set", "debug=",
        ])
        .unwrap();
        match h.command {
            PluginCommands::Settings { id, values } => {
                assert_eq!(id, "welcome");
                assert_eq!(
                    values,
                    vec![
                        ("welcome.username".to_string(), "ada".to_string()),
                        ("debug".to_string(), String::new()),
                    ]
                );
            }
            _ => panic!("expected settings"),
        }
    }

    #[test]
    fn test_assignment_requires_name() {
        assert!(parse_assignment("=value").is_err());
        assert!(parse_assignment("novalue").is_err());
    }

    #[test]
    fn test_update_id_is_optional() {
        let h = Harness::try_parse_from(["t", "update"]).unwrap();
        assert!(matches!(h.command, PluginCommands::Update { id: None }));
        let h = Harness::try_parse_from(["t", "update", "docker"]).unwrap();
        assert!(matches!(h.command, PluginCommands::Update { id: Some(ref id) } if id == "docker"));
    }

    #[test]
    fn test_state_colors() {
        assert_eq!(state_color(PluginState::Started), Color::Green);
        assert_eq!(state_color(PluginState::Failed), Color::Red);
        assert_eq!(state_color(PluginState::Resolved), Color::Reset);
    }
}
