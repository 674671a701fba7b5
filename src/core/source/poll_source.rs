//! Metadata polling for filesystems without reliable notifications

use super::{ChangeSignal, EventSink, EventSource, SignalOrigin};
use crate::core::errors::SourceError;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tokio::fs;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::debug;

/// What the poller compares between ticks
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Fingerprint {
    modified: Option<SystemTime>,
    len: u64,
}

impl Fingerprint {
    fn from_metadata(metadata: &std::fs::Metadata) -> Self {
        Self {
            modified: metadata.modified().ok(),
            len: metadata.len(),
        }
    }
}

/// Polls the file's modification time and length on an interval
pub struct PollSource {
    file_path: PathBuf,
    poll_interval: Duration,
    handle: Option<JoinHandle<()>>,
}

impl PollSource {
    pub fn new(file_path: impl Into<PathBuf>) -> Self {
        Self::with_poll_interval(file_path, Duration::from_secs(1))
    }

    pub fn with_poll_interval(file_path: impl Into<PathBuf>, poll_interval: Duration) -> Self {
        Self {
            file_path: file_path.into(),
            poll_interval,
            handle: None,
        }
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }
}

async fn fingerprint(path: &Path) -> Option<Fingerprint> {
    fs::metadata(path)
        .await
        .ok()
        .map(|metadata| Fingerprint::from_metadata(&metadata))
}

impl EventSource for PollSource {
    fn bind(&mut self, sink: EventSink) -> Result<(), SourceError> {
        if self.handle.is_some() {
            return Err(SourceError::AlreadyBound {
                source_type: self.source_type(),
            });
        }

        let runtime = tokio::runtime::Handle::try_current().map_err(|_| SourceError::NoRuntime {
            source_type: self.source_type(),
        })?;

        // Baseline taken synchronously so a write right after bind is seen
        let baseline = std::fs::metadata(&self.file_path)
            .ok()
            .map(|metadata| Fingerprint::from_metadata(&metadata));
        let file_path = self.file_path.clone();
        let poll_interval = self.poll_interval;

        let handle = runtime.spawn(async move {
            let mut interval = tokio::time::interval(poll_interval);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            let mut last = baseline;

            loop {
                interval.tick().await;

                if sink.is_closed() {
                    break;
                }

                let current = fingerprint(&file_path).await;
                // A vanished file is not a change; the next write will be
                if current.is_some() && current != last {
                    sink.emit(ChangeSignal::new(file_path.clone(), SignalOrigin::Poll));
                }
                if current.is_some() {
                    last = current;
                }
            }

            debug!(file = %file_path.display(), "Poll loop stopped");
        });

        debug!(
            file = %self.file_path.display(),
            interval_ms = self.poll_interval.as_millis() as u64,
            "Polling configuration file"
        );
        self.handle = Some(handle);
        Ok(())
    }

    fn unbind(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }

    fn source_type(&self) -> &'static str {
        "poll"
    }
}

impl Drop for PollSource {
    fn drop(&mut self) {
        self.unbind();
    }
}
