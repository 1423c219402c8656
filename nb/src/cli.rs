//! CLI command definitions

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Nudgebot - task-reminder chat assistant
#[derive(Parser)]
#[command(name = "nb", about = "Task-reminder chat assistant", version)]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true, help = "Path to config file")]
    pub config: Option<PathBuf>,

    /// Log level (TRACE, DEBUG, INFO, WARN, ERROR)
    #[arg(
        short = 'l',
        long = "log-level",
        global = true,
        help = "Log level (TRACE, DEBUG, INFO, WARN, ERROR)"
    )]
    pub log_level: Option<String>,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Option<Command>,
}

/// CLI subcommands
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the bot daemon (default)
    Run,

    /// Print the effective configuration and exit
    Config,
}
