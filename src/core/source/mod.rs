//! File event sources
//!
//! A source turns "the watched file may have changed" into [`ChangeSignal`]s
//! pushed onto the dispatcher's bounded queue. Sources are allowed to be
//! chatty and to deliver duplicates; the dispatcher reparses on every signal
//! it drains.

pub mod manual;
pub mod notify_source;
pub mod poll_source;
#[cfg(unix)]
pub mod signal_source;

pub use manual::{ManualSource, ManualTrigger};
pub use notify_source::NotifySource;
pub use poll_source::PollSource;
#[cfg(unix)]
pub use signal_source::SignalSource;

use crate::core::errors::SourceError;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::trace;

/// What produced a change signal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum SignalOrigin {
    FileSystem,
    Poll,
    Signal,
    Manual,
    Startup,
}

/// A bare "something changed" notification; the path is for logging only
#[derive(Debug, Clone)]
pub struct ChangeSignal {
    pub path: PathBuf,
    pub origin: SignalOrigin,
    pub observed_at: DateTime<Utc>,
}

impl ChangeSignal {
    pub fn new(path: impl Into<PathBuf>, origin: SignalOrigin) -> Self {
        Self {
            path: path.into(),
            origin,
            observed_at: Utc::now(),
        }
    }
}

/// Sending half of the dispatcher's reload queue
#[derive(Debug, Clone)]
pub struct EventSink {
    sender: mpsc::Sender<ChangeSignal>,
}

impl EventSink {
    /// Create a sink and the receiver the dispatcher drains
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<ChangeSignal>) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        (Self { sender }, receiver)
    }

    /// Queue a signal without blocking
    ///
    /// Returns `false` when the signal was not queued. A full queue already
    /// holds a signal that will trigger a later reparse, so dropping is safe.
    pub fn emit(&self, signal: ChangeSignal) -> bool {
        match self.sender.try_send(signal) {
            Ok(()) => true,
            Err(TrySendError::Full(signal)) => {
                trace!(path = %signal.path.display(), "Reload queue full, signal coalesced");
                false
            }
            Err(TrySendError::Closed(_)) => false,
        }
    }

    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }
}

/// Trait for file event sources
///
/// `bind` attaches the source to the dispatcher's queue. `unbind` detaches it
/// and releases any OS resources; it must be safe to call more than once.
pub trait EventSource: Send {
    fn bind(&mut self, sink: EventSink) -> Result<(), SourceError>;

    fn unbind(&mut self);

    /// Get the source type name for debugging
    fn source_type(&self) -> &'static str;
}

/// Directory to watch and file name to match for a watched file path
pub(crate) fn split_watch_path(path: &Path) -> Result<(PathBuf, std::ffi::OsString), SourceError> {
    let file_name = path
        .file_name()
        .map(|name| name.to_os_string())
        .ok_or_else(|| SourceError::NotAFile {
            path: path.to_path_buf(),
        })?;

    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };

    Ok((parent, file_name))
}
