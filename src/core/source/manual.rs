//! Programmatic change signals

use super::{ChangeSignal, EventSink, EventSource, SignalOrigin};
use crate::core::errors::SourceError;
use parking_lot::Mutex;
use std::path::PathBuf;
use std::sync::Arc;

type SharedSink = Arc<Mutex<Option<EventSink>>>;

/// A source that only fires when its [`ManualTrigger`] is used
pub struct ManualSource {
    file_path: PathBuf,
    sink: SharedSink,
}

impl ManualSource {
    pub fn new(file_path: impl Into<PathBuf>) -> Self {
        Self {
            file_path: file_path.into(),
            sink: Arc::new(Mutex::new(None)),
        }
    }

    /// Handle that fires signals into this source once it is bound
    pub fn trigger(&self) -> ManualTrigger {
        ManualTrigger {
            file_path: self.file_path.clone(),
            sink: Arc::clone(&self.sink),
        }
    }
}

impl EventSource for ManualSource {
    fn bind(&mut self, sink: EventSink) -> Result<(), SourceError> {
        let mut slot = self.sink.lock();
        if slot.is_some() {
            return Err(SourceError::AlreadyBound {
                source_type: self.source_type(),
            });
        }
        *slot = Some(sink);
        Ok(())
    }

    fn unbind(&mut self) {
        self.sink.lock().take();
    }

    fn source_type(&self) -> &'static str {
        "manual"
    }
}

/// Cloneable handle that simulates a file event
#[derive(Clone)]
pub struct ManualTrigger {
    file_path: PathBuf,
    sink: SharedSink,
}

impl ManualTrigger {
    /// Fire one change signal; `false` when unbound or the queue is full
    pub fn fire(&self) -> bool {
        match self.sink.lock().as_ref() {
            Some(sink) => sink.emit(ChangeSignal::new(self.file_path.clone(), SignalOrigin::Manual)),
            None => false,
        }
    }

    pub fn is_bound(&self) -> bool {
        self.sink.lock().is_some()
    }
}
