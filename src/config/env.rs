//! Environment variable overrides for dispatcher options

use super::options::{DispatcherOptions, WatchMode};
use std::env;
use std::fmt::Display;
use std::str::FromStr;
use tracing::{debug, warn};

pub const ENV_PREFIX: &str = "HOTRELOAD_";

/// Environment variable override source
pub struct EnvOverrides {
    prefix: String,
}

impl Default for EnvOverrides {
    fn default() -> Self {
        Self::new(ENV_PREFIX)
    }
}

impl EnvOverrides {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    fn read<T>(&self, name: &str) -> Option<T>
    where
        T: FromStr,
        T::Err: Display,
    {
        let key = format!("{}{}", self.prefix, name);
        let raw = env::var(&key).ok()?;
        match raw.trim().parse::<T>() {
            Ok(value) => {
                debug!("Applied env override: {} = {}", key, raw.trim());
                Some(value)
            }
            Err(e) => {
                warn!("Ignoring invalid value for {}: {:?} ({})", key, raw, e);
                None
            }
        }
    }

    /// Apply environment overrides to existing options
    ///
    /// Unparsable values are ignored with a warning.
    pub fn apply(&self, mut options: DispatcherOptions) -> DispatcherOptions {
        if let Some(capacity) = self.read::<usize>("QUEUE_CAPACITY") {
            options.queue_capacity = capacity;
        }
        if let Some(capacity) = self.read::<usize>("REPORT_CAPACITY") {
            options.report_capacity = capacity;
        }
        if let Some(debounce) = self.read::<u64>("DEBOUNCE_MS") {
            options.debounce_ms = debounce;
        }
        if let Some(mode) = self.read::<WatchMode>("WATCH_MODE") {
            options.watch_mode = mode;
        }
        if let Some(interval) = self.read::<u64>("POLL_INTERVAL_MS") {
            options.poll_interval_ms = interval;
        }
        if let Some(enabled) = self.read::<bool>("DISPATCH_ON_START") {
            options.dispatch_on_start = enabled;
        }
        options
    }
}

impl DispatcherOptions {
    /// Defaults with `HOTRELOAD_*` overrides applied
    pub fn from_env() -> Self {
        EnvOverrides::default().apply(Self::default())
    }
}
