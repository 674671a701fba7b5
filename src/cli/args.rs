use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// Command line interface for the hot-reload dispatcher.
///
/// # Examples
///
/// ```bash
/// # Watch a file and print every dispatch report as a JSON line
/// hotreload watch config.yaml
///
/// # Validate a file against the bundled components and exit
/// hotreload check config.yaml
/// ```
#[derive(Parser)]
#[command(name = "hotreload")]
#[command(about = "Watch a configuration file and hot-reload subscribed components")]
#[command(version)]
pub struct Cli {
    /// The command to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose logging for debugging
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Watch a configuration file and apply changes until interrupted
    Watch(WatchArgs),

    /// Parse a configuration file, run one dispatch and report rejections
    Check(CheckArgs),
}

#[derive(Args, Debug, Clone)]
pub struct WatchArgs {
    /// Configuration file (.yaml, .yml, .json or .toml)
    pub file: PathBuf,

    /// Poll file metadata instead of using OS notifications
    #[arg(long)]
    pub poll: bool,

    /// Polling interval in milliseconds
    #[arg(long)]
    pub poll_interval_ms: Option<u64>,

    /// Coalesce change signals arriving within this window
    #[arg(long)]
    pub debounce_ms: Option<u64>,

    /// Reload once right after starting
    #[arg(long)]
    pub dispatch_on_start: bool,

    /// Reload on SIGHUP instead of watching the file
    #[arg(long, conflicts_with = "poll")]
    pub sighup: bool,
}

#[derive(Args, Debug, Clone)]
pub struct CheckArgs {
    /// Configuration file (.yaml, .yml, .json or .toml)
    pub file: PathBuf,
}
