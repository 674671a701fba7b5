//! OS file notifications through the `notify` crate

use super::{split_watch_path, ChangeSignal, EventSink, EventSource, SignalOrigin};
use crate::core::errors::SourceError;
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::PathBuf;
use tracing::{debug, info, warn};

/// Watches the parent directory of the configuration file
///
/// Watching the directory rather than the file keeps delivering events after
/// an editor replaces the file with an atomic rename, which would orphan a
/// watch on the original inode.
pub struct NotifySource {
    file_path: PathBuf,
    watcher: Option<RecommendedWatcher>,
}

impl NotifySource {
    pub fn new(file_path: impl Into<PathBuf>) -> Self {
        Self {
            file_path: file_path.into(),
            watcher: None,
        }
    }

    pub fn is_bound(&self) -> bool {
        self.watcher.is_some()
    }
}

fn is_relevant(kind: &EventKind) -> bool {
    matches!(kind, EventKind::Create(_) | EventKind::Modify(_))
}

impl EventSource for NotifySource {
    fn bind(&mut self, sink: EventSink) -> Result<(), SourceError> {
        if self.watcher.is_some() {
            return Err(SourceError::AlreadyBound {
                source_type: self.source_type(),
            });
        }

        let (directory, file_name) = split_watch_path(&self.file_path)?;
        let file_path = self.file_path.clone();

        let mut watcher = notify::recommended_watcher(move |result: notify::Result<Event>| match result {
            Ok(event) => {
                if !is_relevant(&event.kind) {
                    return;
                }
                if event
                    .paths
                    .iter()
                    .any(|path| path.file_name() == Some(file_name.as_os_str()))
                {
                    sink.emit(ChangeSignal::new(file_path.clone(), SignalOrigin::FileSystem));
                }
            }
            Err(e) => warn!(file = %file_path.display(), error = %e, "File watcher error"),
        })
        .map_err(|e| SourceError::Watch {
            path: self.file_path.clone(),
            source: e,
        })?;

        watcher
            .watch(&directory, RecursiveMode::NonRecursive)
            .map_err(|e| SourceError::Watch {
                path: directory.clone(),
                source: e,
            })?;

        info!(
            file = %self.file_path.display(),
            directory = %directory.display(),
            "Watching configuration directory"
        );
        self.watcher = Some(watcher);
        Ok(())
    }

    fn unbind(&mut self) {
        if self.watcher.take().is_some() {
            debug!(file = %self.file_path.display(), "File watcher released");
        }
    }

    fn source_type(&self) -> &'static str {
        "notify"
    }
}
