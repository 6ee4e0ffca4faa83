//! `tanmi-dock` — command-line surface over the store-and-link engine.

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use tanmi_cli::{Cli, Commands};

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Link { project, platforms } => tanmi_cli::cmd::link::run(project, platforms),
        Commands::Unlink { project } => tanmi_cli::cmd::unlink::run(project),
        Commands::Clean { strategy } => tanmi_cli::cmd::clean::run(strategy),
        Commands::Repair { prune_unknown } => tanmi_cli::cmd::repair::run(prune_unknown),
    }
}
