//! # hot_reload
//!
//! A process-internal configuration hot-reload dispatcher. A
//! [`ReloadDispatcher`] watches one structured configuration file (YAML, JSON
//! or TOML), reparses it whenever it changes and delivers the subtree at each
//! subscriber's path to that subscriber. Subscribers validate and apply the
//! new configuration, or reject it and keep serving the old one.
//!
//! ## Quick Start
//!
//! ```no_run
//! use hot_reload::components::ReloadableMiddleware;
//! use hot_reload::ReloadDispatcher;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let dispatcher = ReloadDispatcher::new("config.yaml");
//!     let middleware = Arc::new(ReloadableMiddleware::default());
//!     middleware.register(&dispatcher, "middleware")?;
//!
//!     dispatcher.start()?;
//!     // ... serve traffic; middleware.timeout() follows the file
//!     Ok(())
//! }
//! ```
//!
//! ## Module Overview
//!
//! - [`core`] - Documents, event sources, the registry, the dispatcher and the
//!   reloadable component framework
//! - [`components`] - Bundled reloadable components (logger, HTTP middleware)
//! - [`config`] - Dispatcher options and environment overrides
//! - `cli` - The `hotreload` binary's commands

/// Bundled reloadable components
pub mod components;
/// Dispatcher runtime options
pub mod config;
/// Core dispatch machinery
pub mod core;

/// Command-line interface and argument parsing
#[cfg(feature = "cli")]
pub mod cli;

pub use crate::config::{DispatcherOptions, WatchMode};
pub use crate::core::*;
