use anyhow::{Context, Result};
use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};

use crate::cli::args::WatchArgs;
use crate::cli::commands::utils::{initial_log_settings, initial_middleware_settings};
use crate::cli::commands::Command;
use crate::components::{init_logging, ReloadableLogger, ReloadableMiddleware};
use crate::config::{DispatcherOptions, WatchMode};
use crate::core::dispatcher::{DispatchEvent, DispatcherBuilder, ReloadDispatcher};
use crate::core::document::{DocumentLoader, FileLoader};
#[cfg(unix)]
use crate::core::source::SignalSource;

pub struct WatchCommand {
    args: WatchArgs,
    verbose: bool,
}

impl WatchCommand {
    pub fn new(args: WatchArgs, verbose: bool) -> Self {
        Self { args, verbose }
    }

    fn options(&self) -> DispatcherOptions {
        let mut options = DispatcherOptions::from_env();
        if self.args.poll {
            options.watch_mode = WatchMode::Poll;
        }
        if let Some(interval) = self.args.poll_interval_ms {
            options.poll_interval_ms = interval;
        }
        if let Some(debounce) = self.args.debounce_ms {
            options.debounce_ms = debounce;
        }
        if self.args.dispatch_on_start {
            options.dispatch_on_start = true;
        }
        options
    }

    fn builder(&self) -> DispatcherBuilder {
        let builder = ReloadDispatcher::builder(&self.args.file).options(self.options());
        if self.args.sighup {
            return with_sighup(builder, &self.args.file);
        }
        builder
    }
}

#[cfg(unix)]
fn with_sighup(builder: DispatcherBuilder, file: &Path) -> DispatcherBuilder {
    builder.source(SignalSource::new(file))
}

#[cfg(not(unix))]
fn with_sighup(builder: DispatcherBuilder, _file: &Path) -> DispatcherBuilder {
    warn!("SIGHUP is not available on this platform, watching the file instead");
    builder
}

#[async_trait]
impl Command for WatchCommand {
    async fn execute(&self) -> Result<()> {
        let document = FileLoader::new(self.args.file.clone())
            .load()
            .await
            .with_context(|| format!("Failed to load {}", self.args.file.display()))?;

        let log_settings = initial_log_settings(&document, self.verbose)?;
        let logging = init_logging(&log_settings)?;
        let logger = Arc::new(ReloadableLogger::with_handle(log_settings, logging));
        let middleware = Arc::new(ReloadableMiddleware::new(initial_middleware_settings(&document)?));

        let dispatcher = self.builder().build()?;
        logger.register(&dispatcher, "logger")?;
        middleware.register(&dispatcher, "middleware")?;

        let mut reports = dispatcher.reports();
        let printer = tokio::spawn(async move {
            loop {
                match reports.recv().await {
                    Ok(event) => match render_event(&event) {
                        Ok(line) => println!("{line}"),
                        Err(e) => warn!(error = %e, "Failed to serialize dispatch event"),
                    },
                    Err(RecvError::Lagged(skipped)) => warn!(skipped, "Report printer lagged"),
                    Err(RecvError::Closed) => break,
                }
            }
        });

        dispatcher.start()?;
        info!(
            file = %self.args.file.display(),
            subscriptions = dispatcher.count(),
            "Watching for configuration changes, press Ctrl-C to stop"
        );

        tokio::signal::ctrl_c()
            .await
            .context("Failed to listen for Ctrl-C")?;

        dispatcher.stop();
        let stats = dispatcher.stats();
        drop(dispatcher);
        // Dropping the dispatcher closes the report channel once the worker exits
        let _ = tokio::time::timeout(Duration::from_secs(2), printer).await;

        info!(
            dispatches = stats.dispatches,
            parse_failures = stats.parse_failures,
            handler_failures = stats.handler_failures,
            "Watcher shut down"
        );
        Ok(())
    }
}

fn render_event(event: &DispatchEvent) -> Result<String> {
    Ok(serde_json::to_string(event)?)
}
