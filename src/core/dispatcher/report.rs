//! Dispatch outcomes, report broadcasting and counters

use super::handler::ReloadStatus;
use crate::core::document::ConfigPath;
use crate::core::errors::ReloadError;
use crate::core::source::SignalOrigin;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::broadcast;

/// Result of invoking one handler
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum OutcomeResult {
    Succeeded(ReloadStatus),
    Failed(ReloadError),
    /// The handler panicked; the payload message is kept when it is a string
    Panicked(String),
}

#[derive(Debug, Clone, Serialize)]
pub struct HandlerOutcome {
    pub id: String,
    pub path: ConfigPath,
    #[serde(with = "crate::core::document::duration")]
    pub elapsed: Duration,
    pub result: OutcomeResult,
}

impl HandlerOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self.result, OutcomeResult::Succeeded(_))
    }

    pub fn status(&self) -> Option<ReloadStatus> {
        match self.result {
            OutcomeResult::Succeeded(status) => Some(status),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&ReloadError> {
        match &self.result {
            OutcomeResult::Failed(error) => Some(error),
            _ => None,
        }
    }
}

/// Structured record of one completed dispatch
#[derive(Debug, Clone, Serialize)]
pub struct DispatchReport {
    pub version: u64,
    pub file: PathBuf,
    pub origin: SignalOrigin,
    pub completed_at: DateTime<Utc>,
    pub outcomes: Vec<HandlerOutcome>,
}

impl DispatchReport {
    /// Outcome for a subscription id, if it was part of the snapshot
    pub fn outcome(&self, id: &str) -> Option<&HandlerOutcome> {
        self.outcomes.iter().find(|outcome| outcome.id == id)
    }

    pub fn succeeded(&self) -> impl Iterator<Item = &HandlerOutcome> {
        self.outcomes.iter().filter(|outcome| outcome.is_success())
    }

    /// Failures and panics
    pub fn failed(&self) -> impl Iterator<Item = &HandlerOutcome> {
        self.outcomes.iter().filter(|outcome| !outcome.is_success())
    }

    pub fn applied_count(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|outcome| outcome.status() == Some(ReloadStatus::Applied))
            .count()
    }

    pub fn is_clean(&self) -> bool {
        self.outcomes.iter().all(HandlerOutcome::is_success)
    }
}

/// Event published on the dispatcher's report channel
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "kebab-case")]
pub enum DispatchEvent {
    Completed(DispatchReport),
    ParseFailed {
        file: PathBuf,
        origin: SignalOrigin,
        error: String,
        at: DateTime<Utc>,
    },
}

/// Dispatch event notifier
#[derive(Clone)]
pub struct ReportNotifier {
    sender: broadcast::Sender<DispatchEvent>,
}

impl ReportNotifier {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Publish an event; returns the number of receivers reached
    ///
    /// Having no receivers is normal and not an error.
    pub fn publish(&self, event: DispatchEvent) -> usize {
        self.sender.send(event).unwrap_or(0)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DispatchEvent> {
        self.sender.subscribe()
    }

    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

/// Running counters for a dispatcher
#[derive(Debug, Default)]
pub struct DispatchStats {
    dispatches: AtomicU64,
    parse_failures: AtomicU64,
    handler_failures: AtomicU64,
    handler_panics: AtomicU64,
    coalesced_signals: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub dispatches: u64,
    pub parse_failures: u64,
    pub handler_failures: u64,
    pub handler_panics: u64,
    pub coalesced_signals: u64,
}

impl DispatchStats {
    pub(crate) fn record_dispatch(&self, report: &DispatchReport) {
        self.dispatches.fetch_add(1, Ordering::Relaxed);
        for outcome in &report.outcomes {
            match outcome.result {
                OutcomeResult::Succeeded(_) => {}
                OutcomeResult::Failed(_) => {
                    self.handler_failures.fetch_add(1, Ordering::Relaxed);
                }
                OutcomeResult::Panicked(_) => {
                    self.handler_panics.fetch_add(1, Ordering::Relaxed);
                }
            }
        }
    }

    pub(crate) fn record_parse_failure(&self) {
        self.parse_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_coalesced(&self, count: u64) {
        self.coalesced_signals.fetch_add(count, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            dispatches: self.dispatches.load(Ordering::Relaxed),
            parse_failures: self.parse_failures.load(Ordering::Relaxed),
            handler_failures: self.handler_failures.load(Ordering::Relaxed),
            handler_panics: self.handler_panics.load(Ordering::Relaxed),
            coalesced_signals: self.coalesced_signals.load(Ordering::Relaxed),
        }
    }
}
