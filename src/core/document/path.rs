//! Dotted key paths addressing a subtree of a document

use serde::{Deserialize, Serialize};
use std::fmt;

/// A dotted key path such as `server.http.middleware.cors`
///
/// The empty path addresses the whole document. The raw string is kept
/// verbatim; a malformed path (for example `a..b`) is not rejected here, it
/// simply never resolves.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct ConfigPath {
    raw: String,
    segments: Vec<String>,
}

impl ConfigPath {
    /// The root path, addressing the whole document
    pub fn root() -> Self {
        Self::default()
    }

    pub fn parse(raw: &str) -> Self {
        let segments = if raw.is_empty() {
            Vec::new()
        } else {
            raw.split('.').map(str::to_owned).collect()
        };

        Self {
            raw: raw.to_owned(),
            segments,
        }
    }

    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Append a key segment
    pub fn join(&self, key: &str) -> Self {
        if self.is_root() {
            Self::parse(key)
        } else {
            Self::parse(&format!("{}.{key}", self.raw))
        }
    }

    /// Path of a field inside this subtree, used in error messages
    pub fn field(&self, name: &str) -> String {
        if self.is_root() {
            name.to_owned()
        } else {
            format!("{}.{name}", self.raw)
        }
    }
}

impl fmt::Display for ConfigPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_root() {
            f.write_str("<root>")
        } else {
            f.write_str(&self.raw)
        }
    }
}

impl From<&str> for ConfigPath {
    fn from(raw: &str) -> Self {
        Self::parse(raw)
    }
}

impl From<String> for ConfigPath {
    fn from(raw: String) -> Self {
        Self::parse(&raw)
    }
}

impl From<&ConfigPath> for ConfigPath {
    fn from(path: &ConfigPath) -> Self {
        path.clone()
    }
}

impl From<ConfigPath> for String {
    fn from(path: ConfigPath) -> Self {
        path.raw
    }
}
