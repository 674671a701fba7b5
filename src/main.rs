use anyhow::Result;
use hot_reload::cli;

#[tokio::main]
async fn main() -> Result<()> {
    cli::run_cli().await
}
