use anyhow::{bail, Result};
use async_trait::async_trait;

use crate::cli::args::CheckArgs;
use crate::cli::commands::Command;
use crate::components::{LogSettings, MiddlewareSettings, LOG_PATH, MIDDLEWARE_PATH};
use crate::core::dispatcher::{DispatchReport, ReloadDispatcher, ReloadStatus};

/// Dry run: decode and validate every bundled section once
pub struct CheckCommand {
    args: CheckArgs,
}

impl CheckCommand {
    pub fn new(args: CheckArgs) -> Self {
        Self { args }
    }

    pub async fn run(&self) -> Result<DispatchReport> {
        let dispatcher = ReloadDispatcher::builder(&self.args.file).manual().build()?;

        dispatcher.subscribe_fn("logger", LOG_PATH, |update| match update.decode::<LogSettings>()? {
            Some(settings) => {
                settings.validate()?;
                Ok(ReloadStatus::Applied)
            }
            None => Ok(ReloadStatus::Skipped),
        })?;
        dispatcher.subscribe_fn("middleware", MIDDLEWARE_PATH, |update| {
            match update.decode::<MiddlewareSettings>()? {
                Some(settings) => {
                    settings.validate()?;
                    Ok(ReloadStatus::Applied)
                }
                None => Ok(ReloadStatus::Skipped),
            }
        })?;

        Ok(dispatcher.dispatch_now().await?)
    }
}

#[async_trait]
impl Command for CheckCommand {
    async fn execute(&self) -> Result<()> {
        let report = self.run().await?;
        println!("{}", serde_json::to_string_pretty(&report)?);

        let rejected: Vec<&str> = report.failed().map(|outcome| outcome.id.as_str()).collect();
        if !rejected.is_empty() {
            bail!(
                "{} rejected by: {}",
                self.args.file.display(),
                rejected.join(", ")
            );
        }
        Ok(())
    }
}
