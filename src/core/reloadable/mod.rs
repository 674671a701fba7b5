//! Reloadable component framework
//!
//! A component that wants live configuration implements
//! [`ReloadableComponent`] and is wrapped in a [`ReloadableSubscriber`], which
//! runs the four-phase discipline on every update:
//!
//! 1. **Decode** the projected subtree into the component's typed config.
//! 2. **Validate** what the type system cannot express.
//! 3. **Swap** the new value into the component's [`LiveConfig`], keeping the
//!    previous value.
//! 4. **Commit** side effects; on failure the previous value is restored and
//!    an [`ReloadError::Apply`] is returned.
//!
//! Failures in phases 1 and 2 never touch live state.

pub mod live;
pub mod validation;

pub use live::{LiveConfig, DEFAULT_HISTORY_RETENTION};
pub use validation::{ensure, ensure_one_of, ensure_range, ensure_unchanged};

use crate::core::dispatcher::{ConfigUpdate, ReloadDispatcher, ReloadHandler, ReloadResult, ReloadStatus};
use crate::core::document::ConfigPath;
use crate::core::errors::{DispatchError, ReloadError};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use std::fmt::Debug;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// What a component does when its section is missing from the document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AbsentPolicy {
    /// Keep serving the current configuration
    #[default]
    KeepCurrent,
    /// Report [`ReloadError::MissingSection`]
    Reject,
}

/// A component whose configuration can change at runtime
#[async_trait]
pub trait ReloadableComponent: Send + Sync + 'static {
    type Config: DeserializeOwned + Clone + PartialEq + Debug + Send + Sync + 'static;

    /// Name used in logs and apply errors
    fn name(&self) -> &str;

    fn live(&self) -> &LiveConfig<Self::Config>;

    /// Decode the projected subtree; `None` means the path was absent
    fn decode(&self, update: &ConfigUpdate) -> Result<Option<Self::Config>, ReloadError> {
        update.decode()
    }

    fn validate(&self, _config: &Self::Config) -> Result<(), ReloadError> {
        Ok(())
    }

    /// Reject changes to settings that need a restart
    fn check_reloadable(&self, _current: &Self::Config, _next: &Self::Config) -> Result<(), ReloadError> {
        Ok(())
    }

    /// Side effects of installing `next`; runs after the swap
    ///
    /// An error rolls the live configuration back to `previous`. Effects
    /// already performed must be undone before returning the error.
    async fn commit(&self, _previous: &Self::Config, _next: &Self::Config) -> anyhow::Result<()> {
        Ok(())
    }

    fn absent_policy(&self) -> AbsentPolicy {
        AbsentPolicy::KeepCurrent
    }
}

/// Adapts a [`ReloadableComponent`] to the dispatcher's handler contract
pub struct ReloadableSubscriber<C: ReloadableComponent> {
    component: Arc<C>,
    apply_lock: Mutex<()>,
}

impl<C: ReloadableComponent> ReloadableSubscriber<C> {
    pub fn new(component: Arc<C>) -> Self {
        Self {
            component,
            apply_lock: Mutex::new(()),
        }
    }

    pub fn component(&self) -> &Arc<C> {
        &self.component
    }

    /// Validate and install `candidate` as if it came from a dispatch
    pub async fn apply(&self, candidate: C::Config) -> ReloadResult {
        self.component.validate(&candidate)?;

        let _guard = self.apply_lock.lock().await;
        let live = self.component.live();

        let current = live.snapshot();
        if *current == candidate {
            debug!(component = self.component.name(), "Configuration unchanged");
            return Ok(ReloadStatus::Unchanged);
        }

        self.component.check_reloadable(&current, &candidate)?;

        let previous = self.install(Arc::new(candidate)).await?;
        live.record_history(previous);

        info!(component = self.component.name(), "Configuration applied");
        Ok(ReloadStatus::Applied)
    }

    /// Re-install the most recently replaced configuration
    ///
    /// Commit side effects run as for a normal update. A failed rollback
    /// leaves both the live value and the history as they were.
    pub async fn rollback_to_previous(&self) -> ReloadResult {
        let _guard = self.apply_lock.lock().await;
        let live = self.component.live();

        let target = live
            .pop_history()
            .ok_or_else(|| ReloadError::apply(self.component.name(), "no previous configuration to roll back to"))?;

        if let Err(e) = self.install(Arc::clone(&target)).await {
            live.push_history(target);
            return Err(e);
        }

        info!(component = self.component.name(), "Rolled back to previous configuration");
        Ok(ReloadStatus::Applied)
    }

    /// Swap `next` in and commit; restores the previous value on failure
    ///
    /// Callers hold `apply_lock`.
    async fn install(&self, next: Arc<C::Config>) -> Result<Arc<C::Config>, ReloadError> {
        let live = self.component.live();
        let previous = live.swap(Arc::clone(&next));

        if let Err(e) = self.component.commit(&previous, &next).await {
            live.restore(Arc::clone(&previous));
            warn!(
                component = self.component.name(),
                error = %format!("{e:#}"),
                "Commit failed, configuration rolled back"
            );
            return Err(ReloadError::apply(self.component.name(), format!("{e:#}")));
        }

        Ok(previous)
    }
}

#[async_trait]
impl<C: ReloadableComponent> ReloadHandler for ReloadableSubscriber<C> {
    async fn on_config_change(&self, update: &ConfigUpdate) -> ReloadResult {
        let candidate = match self.component.decode(update)? {
            Some(candidate) => candidate,
            None => {
                return match self.component.absent_policy() {
                    AbsentPolicy::KeepCurrent => {
                        debug!(
                            component = self.component.name(),
                            path = %update.path(),
                            "Configuration section absent, keeping current"
                        );
                        Ok(ReloadStatus::Skipped)
                    }
                    AbsentPolicy::Reject => Err(ReloadError::MissingSection {
                        path: update.path().to_string(),
                    }),
                };
            }
        };

        self.apply(candidate).await
    }
}

/// Wrap `component` and subscribe it to `dispatcher` at `path`
///
/// The returned subscriber can be used for [`ReloadableSubscriber::rollback_to_previous`].
pub fn register<C: ReloadableComponent>(
    dispatcher: &ReloadDispatcher,
    id: impl Into<String>,
    path: impl Into<ConfigPath>,
    component: Arc<C>,
) -> Result<Arc<ReloadableSubscriber<C>>, DispatchError> {
    let subscriber = Arc::new(ReloadableSubscriber::new(component));
    dispatcher.subscribe(id, path, Arc::clone(&subscriber) as Arc<dyn ReloadHandler>)?;
    Ok(subscriber)
}
