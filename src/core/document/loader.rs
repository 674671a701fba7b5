//! Document loading from the watched file

use super::{Document, Node};
use crate::core::errors::DocumentError;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::debug;

/// Trait for document loaders
///
/// A loader reads the current contents of the watched artifact and returns
/// an immutable [`Document`]. It must be deterministic on unchanged input and
/// must not modify the file.
#[async_trait]
pub trait DocumentLoader: Send + Sync {
    /// Parse the current contents into a document
    async fn load(&self) -> Result<Document, DocumentError>;

    /// Identity of the loaded artifact, used in diagnostics
    fn describe(&self) -> String;
}

/// Supported structured document formats
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentFormat {
    Yaml,
    Json,
    Toml,
}

impl DocumentFormat {
    /// Detect the format from a file extension
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "yaml" | "yml" => Some(Self::Yaml),
            "json" => Some(Self::Json),
            "toml" => Some(Self::Toml),
            _ => None,
        }
    }

    /// Parse `content` into a document
    ///
    /// Empty content is rejected: it is what a truncate-in-place editor
    /// write looks like before the new bytes land. The root must be a mapping.
    pub fn parse(self, content: &str, path: &Path) -> Result<Document, DocumentError> {
        if content.trim().is_empty() {
            return Err(DocumentError::invalid(path.to_path_buf(), "document is empty"));
        }

        let root = match self {
            Self::Yaml => {
                let value: serde_yaml::Value = serde_yaml::from_str(content)
                    .map_err(|e| DocumentError::yaml(path.to_path_buf(), e))?;
                Node::try_from(value).map_err(|reason| DocumentError::invalid(path.to_path_buf(), reason))?
            }
            Self::Json => {
                let value: serde_json::Value = serde_json::from_str(content)
                    .map_err(|e| DocumentError::json(path.to_path_buf(), e))?;
                Node::from(value)
            }
            Self::Toml => {
                let value: toml::Value = toml::from_str(content)
                    .map_err(|e| DocumentError::toml(path.to_path_buf(), e))?;
                Node::from(value)
            }
        };

        if !root.is_map() {
            return Err(DocumentError::invalid(
                path.to_path_buf(),
                format!("root must be a mapping, found {}", root.kind()),
            ));
        }

        Ok(Document::with_source(root, path))
    }
}

/// File-based document loader
pub struct FileLoader {
    file_path: PathBuf,
    format: Option<DocumentFormat>,
}

impl FileLoader {
    /// Create a loader that picks the format from the file extension
    pub fn new(file_path: PathBuf) -> Self {
        let format = DocumentFormat::from_path(&file_path);
        Self { file_path, format }
    }

    /// Create a loader with an explicit format, ignoring the extension
    pub fn with_format(file_path: PathBuf, format: DocumentFormat) -> Self {
        Self {
            file_path,
            format: Some(format),
        }
    }

    /// Get the file path
    pub fn file_path(&self) -> &Path {
        &self.file_path
    }

    pub fn format(&self) -> Option<DocumentFormat> {
        self.format
    }
}

#[async_trait]
impl DocumentLoader for FileLoader {
    async fn load(&self) -> Result<Document, DocumentError> {
        debug!("Loading configuration document from {}", self.file_path.display());

        let format = self.format.ok_or_else(|| DocumentError::UnsupportedFormat {
            path: self.file_path.clone(),
        })?;

        let content = fs::read_to_string(&self.file_path)
            .await
            .map_err(|e| DocumentError::Read {
                path: self.file_path.clone(),
                source: e,
            })?;

        format.parse(&content, &self.file_path)
    }

    fn describe(&self) -> String {
        self.file_path.display().to_string()
    }
}
