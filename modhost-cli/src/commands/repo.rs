//! Update repository commands

use anyhow::{Result, bail};
use clap::{Args, Subcommand};
use comfy_table::{Cell, Color, Table, presets::UTF8_FULL_CONDENSED};
use uuid::Uuid;

use super::{HostOverrides, build_manager};

#[derive(Args)]
pub struct RepoArgs {
    #[command(subcommand)]
    pub command: RepoCommands,
}

#[derive(Subcommand)]
pub enum RepoCommands {
    /// List configured repositories
    List,
    /// Add a repository by URI (directory or `.json` index)
    Add {
        uri: String,
        /// Recorded as the repository's creator
        #[arg(long, default_value = "cli")]
        created_by: String,
    },
    /// Enable a repository
    Enable { id: Uuid },
    /// Disable a repository
    Disable { id: Uuid },
    /// Remove a repository
    Remove { id: Uuid },
}

pub async fn run(args: RepoArgs, overrides: &HostOverrides) -> Result<()> {
    let manager = build_manager(overrides)?;

    match args.command {
        RepoCommands::List => {
            let repositories = manager.repositories().list()?;
            if repositories.is_empty() {
                println!("No repositories configured");
                return Ok(());
            }
            let mut table = Table::new();
            table.load_preset(UTF8_FULL_CONDENSED);
            table.set_header(vec![
                Cell::new("Id").fg(Color::Cyan),
                Cell::new("URI").fg(Color::Cyan),
                Cell::new("Enabled").fg(Color::Cyan),
                Cell::new("Added").fg(Color::Cyan),
            ]);
            for r in repositories {
                table.add_row(vec![
                    Cell::new(r.id),
                    Cell::new(&r.uri),
                    Cell::new(if r.enabled { "yes" } else { "no" }),
                    Cell::new(format!(
                        "{} by {}",
                        r.created_at.format("%Y-%m-%d"),
                        r.created_by
                    )),
                ]);
            }
            println!("{table}");
        }
        RepoCommands::Add { uri, created_by } => {
            let repository = manager.add_repository(&uri, &created_by).await?;
            println!("Added repository {} ({})", repository.id, repository.uri);
        }
        RepoCommands::Enable { id } => {
            if !manager.set_repository_enabled(id, true).await? {
                bail!("Repository not found: {id}");
            }
            println!("Enabled repository {id}");
        }
        RepoCommands::Disable { id } => {
            if !manager.set_repository_enabled(id, false).await? {
                bail!("Repository not found: {id}");
            }
            println!("Disabled repository {id}");
        }
        RepoCommands::Remove { id } => {
            if !manager.remove_repository(id).await? {
                bail!("Repository not found: {id}");
            }
            println!("Removed repository {id}");
        }
    }

    Ok(())
}
