/// Domain-specific error types for the hot-reload dispatcher using thiserror
///
/// Errors are split by the layer that raises them. Document and source errors
/// come from the external collaborators, dispatch errors from misuse of the
/// public API, and reload errors from subscribers rejecting an update. Only a
/// document error aborts a dispatch; reload errors are always local to the
/// subscriber that returned them.
use serde::Serialize;
use std::fmt;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Main error type for hot-reload operations
#[derive(Error, Debug)]
pub enum HotReloadError {
    #[error("Document operation failed")]
    Document(#[from] DocumentError),

    #[error("Event source failed")]
    Source(#[from] SourceError),

    #[error("Dispatcher operation failed")]
    Dispatch(#[from] DispatchError),

    #[error("Configuration error")]
    Config(#[from] ConfigError),
}

/// Failures turning the watched file into a document
#[derive(Error, Debug)]
pub enum DocumentError {
    #[error("Failed to read configuration file {path}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("YAML parsing failed in {path}: {message}")]
    Yaml {
        path: PathBuf,
        message: String,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("JSON parsing failed in {path}: {message}")]
    Json {
        path: PathBuf,
        message: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("TOML parsing failed in {path}: {message}")]
    Toml {
        path: PathBuf,
        message: String,
        #[source]
        source: toml::de::Error,
    },

    #[error("Unsupported document format for {path}: expected .yaml, .yml, .json or .toml")]
    UnsupportedFormat { path: PathBuf },

    #[error("Invalid document in {path}: {reason}")]
    InvalidStructure { path: PathBuf, reason: String },
}

impl DocumentError {
    pub fn yaml(path: PathBuf, source: serde_yaml::Error) -> Self {
        Self::Yaml {
            path,
            message: source.to_string(),
            source,
        }
    }

    pub fn json(path: PathBuf, source: serde_json::Error) -> Self {
        Self::Json {
            path,
            message: source.to_string(),
            source,
        }
    }

    pub fn toml(path: PathBuf, source: toml::de::Error) -> Self {
        Self::Toml {
            path,
            message: source.message().to_string(),
            source,
        }
    }

    pub fn invalid(path: PathBuf, reason: impl Into<String>) -> Self {
        Self::InvalidStructure {
            path,
            reason: reason.into(),
        }
    }
}

/// Failures binding a file event source
#[derive(Error, Debug)]
pub enum SourceError {
    #[error("Failed to watch {path}")]
    Watch {
        path: PathBuf,
        #[source]
        source: notify::Error,
    },

    #[error("Watched path {path} does not name a file")]
    NotAFile { path: PathBuf },

    #[error("Failed to install signal handler")]
    Signal {
        #[source]
        source: io::Error,
    },

    #[error("Event source {source_type} requires a running tokio runtime")]
    NoRuntime { source_type: &'static str },

    #[error("Event source {source_type} is already bound")]
    AlreadyBound { source_type: &'static str },
}

/// Errors surfaced by the dispatcher's public API
#[derive(Error, Debug)]
pub enum DispatchError {
    #[error("Invalid subscription id {id:?}: {reason}")]
    InvalidSubscriptionId { id: String, reason: String },

    #[error("Dispatcher has been stopped; construct a new dispatcher to watch again")]
    Stopped,

    #[error("Dispatcher is not watching")]
    NotWatching,

    #[error("Dispatcher requires a running tokio runtime")]
    NoRuntime,

    #[error("Reload queue is closed")]
    QueueClosed,

    #[error("Failed to bind event source")]
    Source(#[from] SourceError),

    #[error("Failed to reparse configuration document")]
    Document(#[from] DocumentError),

    #[error("Invalid dispatcher options")]
    Options(#[from] ConfigError),
}

/// Invalid runtime settings for the dispatcher or the bundled components
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid configuration value for {field}: {value} - {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Failed to initialize logging: {reason}")]
    Logging { reason: String },
}

/// Why a subscriber rejected an update
///
/// This is the tagged result of the apply-or-rollback contract. The
/// dispatcher never acts on the variant beyond logging and reporting it.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum ReloadError {
    #[error("Failed to decode {path}: {message}")]
    Decode { path: String, message: String },

    #[error("Invalid value for {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("Failed to apply {component} configuration, rolled back: {reason}")]
    Apply { component: String, reason: String },

    #[error("{field} cannot be changed at runtime; restart required")]
    NotReloadable { field: String },

    #[error("Configuration section {path} is missing")]
    MissingSection { path: String },
}

impl ReloadError {
    pub fn validation(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            reason: reason.into(),
        }
    }

    pub fn apply(component: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Apply {
            component: component.into(),
            reason: reason.into(),
        }
    }

    pub fn not_reloadable(field: impl Into<String>) -> Self {
        Self::NotReloadable {
            field: field.into(),
        }
    }

    pub fn kind(&self) -> ReloadErrorKind {
        match self {
            Self::Decode { .. } => ReloadErrorKind::Decode,
            Self::Validation { .. } => ReloadErrorKind::Validation,
            Self::Apply { .. } => ReloadErrorKind::Apply,
            Self::NotReloadable { .. } => ReloadErrorKind::NotReloadable,
            Self::MissingSection { .. } => ReloadErrorKind::MissingSection,
        }
    }

    /// Operator-actionable: the change is valid but needs a process restart.
    pub fn requires_restart(&self) -> bool {
        matches!(self, Self::NotReloadable { .. })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ReloadErrorKind {
    Decode,
    Validation,
    Apply,
    NotReloadable,
    MissingSection,
}

impl ReloadErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Decode => "decode",
            Self::Validation => "validation",
            Self::Apply => "apply",
            Self::NotReloadable => "not-reloadable",
            Self::MissingSection => "missing-section",
        }
    }
}

impl fmt::Display for ReloadErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Render an error and its source chain on one line
pub fn display_chain(error: &dyn std::error::Error) -> String {
    let mut out = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        let text = cause.to_string();
        if !out.contains(&text) {
            out.push_str(": ");
            out.push_str(&text);
        }
        source = cause.source();
    }
    out
}
