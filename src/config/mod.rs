//! Dispatcher runtime options and their environment overrides

pub mod env;
pub mod options;

pub use env::{EnvOverrides, ENV_PREFIX};
pub use options::{DispatcherOptions, WatchMode};
