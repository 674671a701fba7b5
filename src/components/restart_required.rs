//! Sections that can only change with a process restart

use crate::core::errors::ReloadError;
use crate::core::reloadable::{ensure_unchanged, LiveConfig, ReloadableComponent};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use std::fmt::Debug;

/// Guards a section such as listen addresses or TLS material
///
/// Re-delivering the current value is accepted as unchanged; any difference
/// is reported as [`ReloadError::NotReloadable`] so operators know to restart.
pub struct RestartRequired<T> {
    name: String,
    field: String,
    live: LiveConfig<T>,
}

impl<T> RestartRequired<T> {
    /// `field` names the section in restart-required errors
    pub fn new(name: impl Into<String>, field: impl Into<String>, current: T) -> Self {
        Self {
            name: name.into(),
            field: field.into(),
            live: LiveConfig::with_retention(current, 0),
        }
    }
}

impl<T: Clone> RestartRequired<T> {
    /// The value the process started with
    pub fn get(&self) -> T {
        self.live.get()
    }
}

#[async_trait]
impl<T> ReloadableComponent for RestartRequired<T>
where
    T: DeserializeOwned + Clone + PartialEq + Debug + Send + Sync + 'static,
{
    type Config = T;

    fn name(&self) -> &str {
        &self.name
    }

    fn live(&self) -> &LiveConfig<T> {
        &self.live
    }

    fn check_reloadable(&self, current: &T, next: &T) -> Result<(), ReloadError> {
        ensure_unchanged(current, next, &self.field)
    }
}
