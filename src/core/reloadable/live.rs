//! Reader-writer guarded live configuration with bounded history

use parking_lot::RwLock;
use std::collections::VecDeque;
use std::sync::Arc;

pub const DEFAULT_HISTORY_RETENTION: usize = 5;

/// The configuration a component is currently serving
///
/// Readers get either the old or the new value, never a mix: a swap replaces
/// the whole `Arc` under the writer lock. Readers should copy out what they
/// need and drop the guard before doing I/O.
pub struct LiveConfig<T> {
    current: RwLock<Arc<T>>,
    history: RwLock<VecDeque<Arc<T>>>,
    retention: usize,
}

impl<T> LiveConfig<T> {
    pub fn new(initial: T) -> Self {
        Self::with_retention(initial, DEFAULT_HISTORY_RETENTION)
    }

    pub fn with_retention(initial: T, retention: usize) -> Self {
        Self {
            current: RwLock::new(Arc::new(initial)),
            history: RwLock::new(VecDeque::with_capacity(retention)),
            retention,
        }
    }

    /// Run `f` against the live value under the reader lock
    pub fn read<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        f(&self.current.read())
    }

    /// Shared handle to the live value; holds no lock once returned
    pub fn snapshot(&self) -> Arc<T> {
        Arc::clone(&self.current.read())
    }

    /// Install `next` and return the value it replaced
    pub fn swap(&self, next: Arc<T>) -> Arc<T> {
        std::mem::replace(&mut *self.current.write(), next)
    }

    /// Put back a value captured by [`LiveConfig::swap`]
    pub fn restore(&self, previous: Arc<T>) {
        *self.current.write() = previous;
    }

    /// Remember a replaced value for [`LiveConfig::pop_history`]
    pub fn record_history(&self, previous: Arc<T>) {
        if self.retention == 0 {
            return;
        }
        let mut history = self.history.write();
        if history.len() == self.retention {
            history.pop_front();
        }
        history.push_back(previous);
    }

    /// Most recent replaced value, removing it from history
    pub fn pop_history(&self) -> Option<Arc<T>> {
        self.history.write().pop_back()
    }

    /// Put a value back on top of the history after a failed rollback
    pub fn push_history(&self, previous: Arc<T>) {
        self.record_history(previous);
    }

    /// Oldest first
    pub fn history(&self) -> Vec<Arc<T>> {
        self.history.read().iter().cloned().collect()
    }

    pub fn history_len(&self) -> usize {
        self.history.read().len()
    }

    pub fn retention(&self) -> usize {
        self.retention
    }
}

impl<T: Clone> LiveConfig<T> {
    /// Owned copy of the live value
    pub fn get(&self) -> T {
        self.current.read().as_ref().clone()
    }
}

impl<T: Default> Default for LiveConfig<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}
