use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

mod commands;
mod config;

#[derive(Parser)]
#[command(name = "modhost", about = "Manage plugin modules, repositories and updates")]
#[command(version, propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Override the module home directory
    #[arg(long, global = true)]
    home: Option<PathBuf>,

    /// Override the staging directory
    #[arg(long, global = true)]
    tmp: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage configuration
    Config(commands::config::ConfigArgs),
    /// Manage plugins
    Plugin(commands::plugin::PluginArgs),
    /// Manage update repositories
    Repo(commands::repo::RepoArgs),
    /// Run the host until interrupted
    Run(commands::run::RunArgs),
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let overrides = commands::HostOverrides {
        home: cli.home,
        tmp: cli.tmp,
    };

    match cli.command {
        Commands::Config(args) => commands::config::run(args, &overrides),
        Commands::Plugin(args) => commands::plugin::run(args, &overrides).await,
        Commands::Repo(args) => commands::repo::run(args, &overrides).await,
        Commands::Run(args) => commands::run::run(args, &overrides).await,
    }
}
