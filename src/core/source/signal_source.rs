//! SIGHUP as a reload trigger

use super::{ChangeSignal, EventSink, EventSource, SignalOrigin};
use crate::core::errors::SourceError;
use std::path::PathBuf;
use tokio::signal::unix::{signal, SignalKind};
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// Emits a change signal every time the process receives SIGHUP
pub struct SignalSource {
    file_path: PathBuf,
    handle: Option<JoinHandle<()>>,
}

impl SignalSource {
    pub fn new(file_path: impl Into<PathBuf>) -> Self {
        Self {
            file_path: file_path.into(),
            handle: None,
        }
    }
}

impl EventSource for SignalSource {
    fn bind(&mut self, sink: EventSink) -> Result<(), SourceError> {
        if self.handle.is_some() {
            return Err(SourceError::AlreadyBound {
                source_type: self.source_type(),
            });
        }

        let runtime = tokio::runtime::Handle::try_current().map_err(|_| SourceError::NoRuntime {
            source_type: self.source_type(),
        })?;

        let mut hangup = {
            let _guard = runtime.enter();
            signal(SignalKind::hangup()).map_err(|e| SourceError::Signal { source: e })?
        };

        let file_path = self.file_path.clone();
        let handle = runtime.spawn(async move {
            while hangup.recv().await.is_some() {
                info!(file = %file_path.display(), "SIGHUP received, scheduling reload");
                if !sink.emit(ChangeSignal::new(file_path.clone(), SignalOrigin::Signal)) && sink.is_closed() {
                    break;
                }
            }
            debug!("SIGHUP listener stopped");
        });

        self.handle = Some(handle);
        Ok(())
    }

    fn unbind(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }

    fn source_type(&self) -> &'static str {
        "signal"
    }
}

impl Drop for SignalSource {
    fn drop(&mut self) {
        self.unbind();
    }
}
