pub mod args;
pub mod commands;

pub use args::{CheckArgs, Cli, Commands, WatchArgs};

use anyhow::Result;
use clap::Parser;
use commands::{CheckCommand, Command, WatchCommand};

pub async fn run_cli() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        // Installs its own reloadable subscriber from the watched file
        Commands::Watch(args) => WatchCommand::new(args, cli.verbose).execute().await,
        Commands::Check(args) => {
            let log_level = if cli.verbose { "debug" } else { "warn" };
            tracing_subscriber::fmt()
                .with_env_filter(format!("hot_reload={log_level}"))
                .with_writer(std::io::stderr)
                .init();

            CheckCommand::new(args).execute().await
        }
    }
}
