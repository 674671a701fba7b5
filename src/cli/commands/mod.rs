use anyhow::Result;
use async_trait::async_trait;

pub mod check;
pub mod watch;

pub use check::CheckCommand;
pub use watch::WatchCommand;

/// Trait for CLI command implementations
#[async_trait]
pub trait Command {
    /// Execute the command with the given arguments
    async fn execute(&self) -> Result<()>;
}

/// Common utilities for command implementations
pub mod utils {
    use crate::components::{LogSettings, MiddlewareSettings, LOG_PATH, MIDDLEWARE_PATH};
    use crate::core::document::{decode_section, ConfigPath, Document};
    use crate::core::errors::ReloadError;
    use serde::de::DeserializeOwned;

    /// Decode a section of `document`, falling back to defaults when absent
    pub fn section_or_default<T>(document: &Document, path: &str) -> Result<T, ReloadError>
    where
        T: DeserializeOwned + Default,
    {
        let path = ConfigPath::parse(path);
        match document.get(&path) {
            Some(node) => decode_section(node, &path),
            None => Ok(T::default()),
        }
    }

    pub fn initial_log_settings(document: &Document, verbose: bool) -> Result<LogSettings, ReloadError> {
        let mut settings: LogSettings = section_or_default(document, LOG_PATH)?;
        if verbose {
            settings.level = "debug".to_string();
        }
        Ok(settings)
    }

    pub fn initial_middleware_settings(document: &Document) -> Result<MiddlewareSettings, ReloadError> {
        section_or_default(document, MIDDLEWARE_PATH)
    }
}
