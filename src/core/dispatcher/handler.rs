//! The handler contract between the dispatcher and its subscribers

use crate::core::document::{decode_section, ConfigPath, Document, Node};
use crate::core::errors::ReloadError;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;

/// What a handler did with an update it accepted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ReloadStatus {
    /// The new configuration is live
    Applied,
    /// The projected subtree equals the live configuration
    Unchanged,
    /// The path was absent and the handler kept its current configuration
    Skipped,
}

pub type ReloadResult = Result<ReloadStatus, ReloadError>;

/// One delivery to one subscriber
///
/// Carries the whole document so handlers can look at neighbouring
/// sections, but [`ConfigUpdate::node`] is the projection they normally use.
#[derive(Debug, Clone)]
pub struct ConfigUpdate {
    version: u64,
    path: ConfigPath,
    document: Arc<Document>,
}

impl ConfigUpdate {
    pub fn new(version: u64, path: ConfigPath, document: Arc<Document>) -> Self {
        Self {
            version,
            path,
            document,
        }
    }

    /// Dispatcher version of the reparse this update came from
    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn path(&self) -> &ConfigPath {
        &self.path
    }

    pub fn document(&self) -> &Document {
        &self.document
    }

    /// The subtree at the subscription path; `None` is the absent marker
    pub fn node(&self) -> Option<&Node> {
        self.document.get(&self.path)
    }

    pub fn is_absent(&self) -> bool {
        self.node().is_none()
    }

    /// Decode the projected subtree, passing absence through as `None`
    pub fn decode<T: DeserializeOwned>(&self) -> Result<Option<T>, ReloadError> {
        self.node()
            .map(|node| decode_section(node, &self.path))
            .transpose()
    }
}

/// Trait for configuration change handlers
///
/// The dispatcher calls `on_config_change` sequentially on its own task and
/// never concurrently with itself for one dispatcher. A failure is recorded
/// and the dispatch moves on to the next subscriber.
#[async_trait]
pub trait ReloadHandler: Send + Sync {
    async fn on_config_change(&self, update: &ConfigUpdate) -> ReloadResult;
}

/// Adapter turning a synchronous closure into a [`ReloadHandler`]
pub struct FnHandler<F>(F);

impl<F> FnHandler<F>
where
    F: Fn(&ConfigUpdate) -> ReloadResult + Send + Sync,
{
    pub fn new(f: F) -> Self {
        Self(f)
    }
}

#[async_trait]
impl<F> ReloadHandler for FnHandler<F>
where
    F: Fn(&ConfigUpdate) -> ReloadResult + Send + Sync,
{
    async fn on_config_change(&self, update: &ConfigUpdate) -> ReloadResult {
        (self.0)(update)
    }
}

/// Box a closure as a shareable handler
pub fn handler_fn<F>(f: F) -> Arc<dyn ReloadHandler>
where
    F: Fn(&ConfigUpdate) -> ReloadResult + Send + Sync + 'static,
{
    Arc::new(FnHandler::new(f))
}
