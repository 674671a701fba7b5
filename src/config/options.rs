//! Runtime options for a reload dispatcher

use crate::core::errors::ConfigError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_QUEUE_CAPACITY: usize = 64;
pub const DEFAULT_REPORT_CAPACITY: usize = 128;
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 1000;
pub const MIN_POLL_INTERVAL_MS: u64 = 10;

/// How the default event source observes the file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum WatchMode {
    #[default]
    Notify,
    Poll,
}

impl fmt::Display for WatchMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WatchMode::Notify => f.write_str("notify"),
            WatchMode::Poll => f.write_str("poll"),
        }
    }
}

impl FromStr for WatchMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "notify" => Ok(WatchMode::Notify),
            "poll" => Ok(WatchMode::Poll),
            other => Err(ConfigError::InvalidValue {
                field: "watch-mode".to_string(),
                value: other.to_string(),
                reason: "expected notify or poll".to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct DispatcherOptions {
    /// Bound of the reload signal queue
    pub queue_capacity: usize,
    /// Bound of the report broadcast channel
    pub report_capacity: usize,
    /// Coalescing window; zero dispatches on every signal
    pub debounce_ms: u64,
    pub watch_mode: WatchMode,
    pub poll_interval_ms: u64,
    /// Enqueue one signal when the dispatcher starts
    pub dispatch_on_start: bool,
}

impl Default for DispatcherOptions {
    fn default() -> Self {
        Self {
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            report_capacity: DEFAULT_REPORT_CAPACITY,
            debounce_ms: 0,
            watch_mode: WatchMode::Notify,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            dispatch_on_start: false,
        }
    }
}

impl DispatcherOptions {
    pub fn debounce(&self) -> Option<Duration> {
        (self.debounce_ms > 0).then(|| Duration::from_millis(self.debounce_ms))
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce_ms = debounce.as_millis() as u64;
        self
    }

    pub fn with_watch_mode(mut self, watch_mode: WatchMode) -> Self {
        self.watch_mode = watch_mode;
        self
    }

    pub fn with_dispatch_on_start(mut self, enabled: bool) -> Self {
        self.dispatch_on_start = enabled;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.queue_capacity == 0 {
            return Err(invalid("queue-capacity", self.queue_capacity, "must be at least 1"));
        }
        if self.report_capacity == 0 {
            return Err(invalid("report-capacity", self.report_capacity, "must be at least 1"));
        }
        if self.poll_interval_ms < MIN_POLL_INTERVAL_MS {
            return Err(invalid(
                "poll-interval-ms",
                self.poll_interval_ms,
                &format!("must be at least {MIN_POLL_INTERVAL_MS}"),
            ));
        }
        Ok(())
    }
}

fn invalid(field: &str, value: impl ToString, reason: &str) -> ConfigError {
    ConfigError::InvalidValue {
        field: field.to_string(),
        value: value.to_string(),
        reason: reason.to_string(),
    }
}
