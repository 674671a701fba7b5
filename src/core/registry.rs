//! Subscription registry
//!
//! Maps a subscription id to the path it watches and the handler that
//! receives updates. Mutations take the writer lock; [`SubscriptionRegistry::snapshot`]
//! takes the reader lock and returns an independent copy, so a dispatch in
//! flight never sees subscribes or unsubscribes that happen after it started.
//!
//! Snapshots are ordered lexicographically by id.

use crate::core::dispatcher::handler::ReloadHandler;
use crate::core::document::ConfigPath;
use crate::core::errors::DispatchError;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// A registered handler record
#[derive(Clone)]
pub struct Subscription {
    id: Arc<str>,
    path: ConfigPath,
    handler: Arc<dyn ReloadHandler>,
}

impl Subscription {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn path(&self) -> &ConfigPath {
        &self.path
    }

    pub fn handler(&self) -> &Arc<dyn ReloadHandler> {
        &self.handler
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

/// Thread-safe keyed registry of subscriptions
#[derive(Default)]
pub struct SubscriptionRegistry {
    entries: RwLock<BTreeMap<Arc<str>, Subscription>>,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or silently replace the record keyed by `id`
    ///
    /// Ids must be non-empty, not whitespace-only and free of control
    /// characters. A rejected id leaves the registry unchanged.
    pub fn subscribe(
        &self,
        id: impl Into<String>,
        path: impl Into<ConfigPath>,
        handler: Arc<dyn ReloadHandler>,
    ) -> Result<(), DispatchError> {
        let id = id.into();
        validate_id(&id)?;

        let id: Arc<str> = Arc::from(id);
        let subscription = Subscription {
            id: Arc::clone(&id),
            path: path.into(),
            handler,
        };

        let path = subscription.path.clone();
        let replaced = self.entries.write().insert(Arc::clone(&id), subscription).is_some();
        if replaced {
            debug!(subscription = %id, path = %path, "Replaced subscription");
        } else {
            debug!(subscription = %id, path = %path, "Added subscription");
        }
        Ok(())
    }

    /// Remove the record keyed by `id`; absent ids are a no-op
    ///
    /// Returns whether a record was removed.
    pub fn unsubscribe(&self, id: &str) -> bool {
        let removed = self.entries.write().remove(id).is_some();
        if removed {
            debug!(subscription = id, "Removed subscription");
        }
        removed
    }

    /// Independent copy of the current records, ordered by id
    pub fn snapshot(&self) -> Vec<Subscription> {
        self.entries.read().values().cloned().collect()
    }

    pub fn count(&self) -> usize {
        self.entries.read().len()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.entries.read().contains_key(id)
    }

    pub fn ids(&self) -> Vec<String> {
        self.entries.read().keys().map(|id| id.to_string()).collect()
    }
}

fn validate_id(id: &str) -> Result<(), DispatchError> {
    let reason = if id.is_empty() {
        "id must not be empty"
    } else if id.trim().is_empty() {
        "id must not be whitespace only"
    } else if id.chars().any(char::is_control) {
        "id must not contain control characters"
    } else {
        return Ok(());
    };

    Err(DispatchError::InvalidSubscriptionId {
        id: id.to_string(),
        reason: reason.to_string(),
    })
}
