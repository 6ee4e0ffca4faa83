//! Thin command-line surface over [`tanmi_core`]'s store-and-link engine.
//!
//! Per the store-and-link engine's scope, this crate is deliberately thin:
//! argument parsing, a `tracing` logger, and command handlers that call
//! straight into `tanmi_core::orchestrator::Engine` for `link`, `unlink`,
//! and `clean`. No interactive prompts, no progress bars, no diagnostics
//! command body — those remain external collaborators.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Command handlers, one module per subcommand.
pub mod cmd;
/// Project dependency-configuration discovery shared across commands.
pub mod project;

#[derive(Debug, Parser)]
#[command(name = "tanmi-dock")]
#[command(author, version, about = "Content-addressed dependency store for polyglot C/C++ builds", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Populate a project's third-party directory from the shared content store
    Link {
        /// Project directory (defaults to the current directory)
        #[arg(long)]
        project: Option<PathBuf>,
        /// Platform tags to link (defaults to the project's previously linked set)
        #[arg(long = "platform", value_name = "TAG")]
        platforms: Vec<String>,
    },
    /// Reverse `link`: restore ordinary directories and drop the project's store references
    Unlink {
        /// Project directory (defaults to the current directory)
        #[arg(long)]
        project: Option<PathBuf>,
    },
    /// Evict unreferenced store entries per the configured strategy
    Clean {
        /// Override the configured clean strategy for this run
        #[arg(long, value_parser = ["unreferenced", "unused", "capacity", "manual"])]
        strategy: Option<String>,
    },
    /// Reconcile registry/filesystem drift: stale project records, dangling
    /// local symlinks, and store commits unknown to the registry
    Repair {
        /// Delete commit directories unknown to the registry instead of
        /// registering them with branch/url = "unknown"
        #[arg(long)]
        prune_unknown: bool,
    },
}
