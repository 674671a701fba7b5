//! Logger settings with hot reload
//!
//! Both the level filter and the event formatter sit behind
//! `tracing_subscriber` reload layers, so level, development mode and the
//! caller/span toggles take effect immediately. Format and output
//! destinations are fixed when the subscriber is installed and need a restart.

use crate::core::dispatcher::ReloadDispatcher;
use crate::core::errors::{ConfigError, DispatchError, ReloadError};
use crate::core::reloadable::{
    ensure_one_of, ensure_unchanged, register, LiveConfig, ReloadableComponent, ReloadableSubscriber,
};
use anyhow::Context;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, Subscriber};
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::layer::Layered;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, reload, EnvFilter, Layer, Registry};

pub const LOG_PATH: &str = "log";

const OUTPUTS: [&str; 2] = ["stdout", "stderr"];

type FilteredRegistry = Layered<reload::Layer<EnvFilter, Registry>, Registry>;

pub type FormatLayer = Box<dyn Layer<FilteredRegistry> + Send + Sync>;
pub type FilterHandle = reload::Handle<EnvFilter, Registry>;
pub type FormatHandle = reload::Handle<FormatLayer, FilteredRegistry>;

/// Produces the writer for each rebuilt formatter
pub type WriterFactory = Arc<dyn Fn() -> BoxMakeWriter + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct LogSettings {
    /// Filter directive, e.g. `info` or `hot_reload=debug,warn`
    pub level: String,
    pub format: LogFormat,
    /// Print event targets; text output also gains source locations
    pub development: bool,
    /// Omit file and line numbers
    pub disable_caller: bool,
    /// Omit the enclosing span context from each event
    pub disable_stacktrace: bool,
    pub output_paths: Vec<String>,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Text,
            development: false,
            disable_caller: false,
            disable_stacktrace: false,
            output_paths: vec!["stdout".to_string()],
        }
    }
}

impl LogSettings {
    pub fn validate(&self) -> Result<(), ReloadError> {
        EnvFilter::try_new(&self.level)
            .map_err(|e| ReloadError::validation("log.level", e.to_string()))?;
        for output in &self.output_paths {
            ensure_one_of(output, &OUTPUTS, "log.output-paths")?;
        }
        Ok(())
    }

    /// Whether the event formatter must be rebuilt to move to `next`
    fn layout_differs(&self, next: &Self) -> bool {
        self.development != next.development
            || self.disable_caller != next.disable_caller
            || self.disable_stacktrace != next.disable_stacktrace
    }

    fn writer_factory(&self) -> WriterFactory {
        let stderr = self.output_paths.first().is_some_and(|o| o == "stderr");
        Arc::new(move || {
            if stderr {
                BoxMakeWriter::new(std::io::stderr)
            } else {
                BoxMakeWriter::new(std::io::stdout)
            }
        })
    }
}

fn format_layer(settings: &LogSettings, writer: BoxMakeWriter) -> FormatLayer {
    let with_caller = !settings.disable_caller;
    let with_spans = !settings.disable_stacktrace;

    match settings.format {
        LogFormat::Json => fmt::layer()
            .json()
            .with_writer(writer)
            .with_target(settings.development)
            .with_file(with_caller)
            .with_line_number(with_caller)
            .with_current_span(with_spans)
            .with_span_list(with_spans)
            .boxed(),
        LogFormat::Text => {
            let layer = fmt::layer()
                .with_writer(writer)
                .with_target(settings.development)
                .with_file(with_caller && settings.development)
                .with_line_number(with_caller && settings.development);
            if with_spans {
                layer.boxed()
            } else {
                // Compact output drops span names
                layer.compact().boxed()
            }
        }
    }
}

/// Reload handles a [`ReloadableLogger`] drives
#[derive(Clone)]
pub struct LoggingHandle {
    filter: FilterHandle,
    format: FormatHandle,
    writer: WriterFactory,
}

impl LoggingHandle {
    pub fn filter(&self) -> &FilterHandle {
        &self.filter
    }
}

/// Build, without installing, the subscriber described by `settings`
pub fn logging_subscriber(
    settings: &LogSettings,
    writer: WriterFactory,
) -> Result<(impl Subscriber + Send + Sync + 'static, LoggingHandle), ConfigError> {
    settings
        .validate()
        .map_err(|e| ConfigError::Logging { reason: e.to_string() })?;

    let filter = EnvFilter::try_new(&settings.level).map_err(|e| ConfigError::Logging {
        reason: e.to_string(),
    })?;
    let (filter_layer, filter) = reload::Layer::new(filter);
    let (format, format_handle) = reload::Layer::new(format_layer(settings, writer()));

    let subscriber = tracing_subscriber::registry().with(filter_layer).with(format);
    Ok((
        subscriber,
        LoggingHandle {
            filter,
            format: format_handle,
            writer,
        },
    ))
}

/// Install the global subscriber described by `settings`
pub fn init_logging(settings: &LogSettings) -> Result<LoggingHandle, ConfigError> {
    let (subscriber, handle) = logging_subscriber(settings, settings.writer_factory())?;
    subscriber
        .try_init()
        .map_err(|e| ConfigError::Logging { reason: e.to_string() })?;
    Ok(handle)
}

/// The process logger as a reloadable component
pub struct ReloadableLogger {
    live: LiveConfig<LogSettings>,
    handle: Option<LoggingHandle>,
}

impl ReloadableLogger {
    /// A logger that tracks settings without an installed subscriber to drive
    pub fn new(settings: LogSettings) -> Self {
        Self {
            live: LiveConfig::new(settings),
            handle: None,
        }
    }

    pub fn with_handle(settings: LogSettings, handle: LoggingHandle) -> Self {
        Self {
            live: LiveConfig::new(settings),
            handle: Some(handle),
        }
    }

    pub fn settings(&self) -> LogSettings {
        self.live.get()
    }

    pub fn level(&self) -> String {
        self.live.read(|s| s.level.clone())
    }

    pub fn is_development(&self) -> bool {
        self.live.read(|s| s.development)
    }

    pub fn caller_enabled(&self) -> bool {
        self.live.read(|s| !s.disable_caller)
    }

    pub fn stacktrace_enabled(&self) -> bool {
        self.live.read(|s| !s.disable_stacktrace)
    }

    /// Subscribe to `dispatcher` at `log`
    pub fn register(
        self: &Arc<Self>,
        dispatcher: &ReloadDispatcher,
        id: &str,
    ) -> Result<Arc<ReloadableSubscriber<Self>>, DispatchError> {
        register(dispatcher, id, LOG_PATH, Arc::clone(self))
    }
}

#[async_trait]
impl ReloadableComponent for ReloadableLogger {
    type Config = LogSettings;

    fn name(&self) -> &str {
        "logger"
    }

    fn live(&self) -> &LiveConfig<LogSettings> {
        &self.live
    }

    fn validate(&self, config: &LogSettings) -> Result<(), ReloadError> {
        config.validate()
    }

    fn check_reloadable(&self, current: &LogSettings, next: &LogSettings) -> Result<(), ReloadError> {
        ensure_unchanged(&current.format, &next.format, "log.format")?;
        ensure_unchanged(&current.output_paths, &next.output_paths, "log.output-paths")
    }

    async fn commit(&self, previous: &LogSettings, next: &LogSettings) -> anyhow::Result<()> {
        if let Some(handle) = &self.handle {
            if previous.level != next.level {
                let directive = EnvFilter::try_new(&next.level)
                    .with_context(|| format!("invalid level {:?}", next.level))?;
                handle
                    .filter
                    .reload(directive)
                    .context("log filter is no longer installed")?;
            }
            if previous.layout_differs(next) {
                handle
                    .format
                    .reload(format_layer(next, (handle.writer)()))
                    .context("log formatter is no longer installed")?;
            }
        }

        info!(
            level = %next.level,
            development = next.development,
            caller = !next.disable_caller,
            stacktrace = !next.disable_stacktrace,
            "Logger configuration reloaded"
        );
        Ok(())
    }
}
