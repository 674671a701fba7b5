//! Reload dispatcher
//!
//! Turns change signals into sequential handler invocations:
//!
//! 1. A bound [`EventSource`] pushes [`ChangeSignal`]s onto a bounded queue.
//! 2. A worker task drains the queue. Signals that arrive after `stop()`
//!    are discarded.
//! 3. Each dispatch reparses the document through the [`DocumentLoader`],
//!    bumps the version, snapshots the registry and invokes every handler in
//!    id order with its projected update.
//! 4. Handler failures and panics are recorded and never abort the dispatch;
//!    a parse failure skips the whole dispatch without bumping the version.
//!
//! Outcomes are logged and published as [`DispatchEvent`]s.
//!
//! # Example
//!
//! ```no_run
//! use hot_reload::{ReloadDispatcher, ReloadStatus};
//!
//! # async fn demo() -> anyhow::Result<()> {
//! let dispatcher = ReloadDispatcher::new("config.yaml");
//! dispatcher.subscribe_fn("logger", "log", |update| {
//!     println!("log section at version {}", update.version());
//!     Ok(ReloadStatus::Applied)
//! })?;
//! dispatcher.start()?;
//! # Ok(())
//! # }
//! ```

pub mod handler;
pub mod report;

pub use handler::{handler_fn, ConfigUpdate, FnHandler, ReloadHandler, ReloadResult, ReloadStatus};
pub use report::{
    DispatchEvent, DispatchReport, DispatchStats, HandlerOutcome, OutcomeResult, ReportNotifier,
    StatsSnapshot,
};

use crate::config::{DispatcherOptions, WatchMode};
use crate::core::document::{ConfigPath, DocumentLoader, FileLoader};
use crate::core::errors::{display_chain, DispatchError, DocumentError};
use crate::core::registry::{Subscription, SubscriptionRegistry};
use crate::core::source::{
    ChangeSignal, EventSink, EventSource, NotifySource, PollSource, SignalOrigin,
};
use chrono::Utc;
use futures::FutureExt;
use serde::Serialize;
use std::any::Any;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{broadcast, mpsc, Mutex, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Lifecycle of a dispatcher; `Stopped` is terminal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum DispatcherState {
    Idle,
    Watching,
    Stopped,
}

impl DispatcherState {
    fn as_u8(self) -> u8 {
        match self {
            DispatcherState::Idle => 0,
            DispatcherState::Watching => 1,
            DispatcherState::Stopped => 2,
        }
    }

    fn from_u8(value: u8) -> Self {
        match value {
            0 => DispatcherState::Idle,
            1 => DispatcherState::Watching,
            _ => DispatcherState::Stopped,
        }
    }
}

impl fmt::Display for DispatcherState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DispatcherState::Idle => f.write_str("idle"),
            DispatcherState::Watching => f.write_str("watching"),
            DispatcherState::Stopped => f.write_str("stopped"),
        }
    }
}

/// State shared between the public handle and the worker task
struct Shared {
    file_path: PathBuf,
    loader: Arc<dyn DocumentLoader>,
    registry: SubscriptionRegistry,
    state: AtomicU8,
    version: AtomicU64,
    notifier: ReportNotifier,
    stats: DispatchStats,
    options: DispatcherOptions,
    /// Serializes dispatches so a handler never runs concurrently with itself
    dispatch_lock: Mutex<()>,
    shutdown: Notify,
}

impl Shared {
    fn state(&self) -> DispatcherState {
        DispatcherState::from_u8(self.state.load(Ordering::SeqCst))
    }

    async fn dispatch(&self, origin: SignalOrigin) -> Result<DispatchReport, DocumentError> {
        let _guard = self.dispatch_lock.lock().await;

        let document = match self.loader.load().await {
            Ok(document) => Arc::new(document),
            Err(e) => {
                let message = display_chain(&e);
                error!(
                    file = %self.file_path.display(),
                    loader = %self.loader.describe(),
                    error = %message,
                    "Failed to reparse configuration, dispatch skipped"
                );
                self.stats.record_parse_failure();
                self.notifier.publish(DispatchEvent::ParseFailed {
                    file: self.file_path.clone(),
                    origin,
                    error: message,
                    at: Utc::now(),
                });
                return Err(e);
            }
        };

        let version = self.version.fetch_add(1, Ordering::SeqCst) + 1;
        let subscriptions = self.registry.snapshot();
        debug!(
            version,
            handlers = subscriptions.len(),
            origin = ?origin,
            "Dispatching configuration update"
        );

        let mut outcomes = Vec::with_capacity(subscriptions.len());
        for subscription in &subscriptions {
            outcomes.push(invoke(subscription, version, &document).await);
        }

        let report = DispatchReport {
            version,
            file: self.file_path.clone(),
            origin,
            completed_at: Utc::now(),
            outcomes,
        };

        info!(
            version,
            file = %self.file_path.display(),
            handlers = report.outcomes.len(),
            applied = report.applied_count(),
            failed = report.failed().count(),
            "Configuration dispatch completed"
        );

        self.stats.record_dispatch(&report);
        self.notifier.publish(DispatchEvent::Completed(report.clone()));
        Ok(report)
    }
}

async fn invoke(
    subscription: &Subscription,
    version: u64,
    document: &Arc<crate::core::document::Document>,
) -> HandlerOutcome {
    let update = ConfigUpdate::new(version, subscription.path().clone(), Arc::clone(document));
    let started = Instant::now();

    let result = AssertUnwindSafe(subscription.handler().on_config_change(&update))
        .catch_unwind()
        .await;
    let elapsed = started.elapsed();

    let result = match result {
        Ok(Ok(status)) => {
            debug!(
                subscription = subscription.id(),
                path = %subscription.path(),
                version,
                status = ?status,
                "Handler accepted update"
            );
            OutcomeResult::Succeeded(status)
        }
        Ok(Err(err)) if err.requires_restart() => {
            warn!(
                subscription = subscription.id(),
                path = %subscription.path(),
                version,
                error = %err,
                "Change requires a restart to take effect"
            );
            OutcomeResult::Failed(err)
        }
        Ok(Err(err)) => {
            warn!(
                subscription = subscription.id(),
                path = %subscription.path(),
                version,
                kind = %err.kind(),
                error = %err,
                "Handler rejected update"
            );
            OutcomeResult::Failed(err)
        }
        Err(payload) => {
            let message = panic_message(payload.as_ref());
            error!(
                subscription = subscription.id(),
                path = %subscription.path(),
                version,
                panic = %message,
                "Handler panicked"
            );
            OutcomeResult::Panicked(message)
        }
    };

    HandlerOutcome {
        id: subscription.id().to_string(),
        path: subscription.path().clone(),
        elapsed,
        result,
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

async fn run_worker(shared: Arc<Shared>, mut receiver: mpsc::Receiver<ChangeSignal>) {
    let debounce = shared.options.debounce();

    loop {
        let signal = tokio::select! {
            biased;
            _ = shared.shutdown.notified() => break,
            signal = receiver.recv() => match signal {
                Some(signal) => signal,
                None => break,
            },
        };

        if shared.state() != DispatcherState::Watching {
            debug!(path = %signal.path.display(), "Dispatcher not watching, signal discarded");
            break;
        }

        let signal = match debounce {
            Some(window) => match coalesce(&shared, &mut receiver, signal, window).await {
                Some(signal) => signal,
                None => break,
            },
            None => signal,
        };

        // stop() may have landed while the window was open
        if shared.state() != DispatcherState::Watching {
            debug!(path = %signal.path.display(), "Dispatcher stopped during debounce, signal discarded");
            break;
        }

        // Parse failures are already logged and published
        let _ = shared.dispatch(signal.origin).await;
    }

    debug!(file = %shared.file_path.display(), "Dispatch worker stopped");
}

/// Absorb signals arriving within `window` of the first one
///
/// Returns `None` when shutdown is requested before the window closes.
async fn coalesce(
    shared: &Shared,
    receiver: &mut mpsc::Receiver<ChangeSignal>,
    mut signal: ChangeSignal,
    window: std::time::Duration,
) -> Option<ChangeSignal> {
    let deadline = tokio::time::Instant::now() + window;
    let mut absorbed = 0u64;

    loop {
        tokio::select! {
            biased;
            _ = shared.shutdown.notified() => return None,
            next = tokio::time::timeout_at(deadline, receiver.recv()) => match next {
                Ok(Some(next)) => {
                    signal = next;
                    absorbed += 1;
                }
                _ => break,
            },
        }
    }

    if absorbed > 0 {
        debug!(absorbed, "Coalesced change signals");
        shared.stats.record_coalesced(absorbed);
    }
    Some(signal)
}

/// Which event source the dispatcher binds on `start()`
enum SourceChoice {
    Default,
    Custom(Box<dyn EventSource>),
    None,
}

/// Builder for a [`ReloadDispatcher`]
pub struct DispatcherBuilder {
    file_path: PathBuf,
    loader: Option<Arc<dyn DocumentLoader>>,
    source: SourceChoice,
    options: DispatcherOptions,
}

impl DispatcherBuilder {
    fn new(file_path: PathBuf) -> Self {
        Self {
            file_path,
            loader: None,
            source: SourceChoice::Default,
            options: DispatcherOptions::default(),
        }
    }

    /// Use a custom document loader instead of the extension-based file loader
    pub fn loader(mut self, loader: Arc<dyn DocumentLoader>) -> Self {
        self.loader = Some(loader);
        self
    }

    /// Bind a custom event source on start
    pub fn source(mut self, source: impl EventSource + 'static) -> Self {
        self.source = SourceChoice::Custom(Box::new(source));
        self
    }

    /// Bind no source; reloads happen only through `trigger` or `dispatch_now`
    pub fn manual(mut self) -> Self {
        self.source = SourceChoice::None;
        self
    }

    pub fn options(mut self, options: DispatcherOptions) -> Self {
        self.options = options;
        self
    }

    pub fn build(self) -> Result<ReloadDispatcher, DispatchError> {
        self.options.validate()?;

        let loader = self
            .loader
            .unwrap_or_else(|| Arc::new(FileLoader::new(self.file_path.clone())));

        let source: Option<Box<dyn EventSource>> = match self.source {
            SourceChoice::Default => Some(match self.options.watch_mode {
                WatchMode::Notify => Box::new(NotifySource::new(self.file_path.clone())),
                WatchMode::Poll => Box::new(PollSource::with_poll_interval(
                    self.file_path.clone(),
                    self.options.poll_interval(),
                )),
            }),
            SourceChoice::Custom(source) => Some(source),
            SourceChoice::None => None,
        };

        Ok(ReloadDispatcher::from_parts(self.file_path, loader, source, self.options))
    }
}

struct Control {
    source: Option<Box<dyn EventSource>>,
    sink: Option<EventSink>,
    receiver: Option<mpsc::Receiver<ChangeSignal>>,
    worker: Option<JoinHandle<()>>,
}

/// Watches one configuration file and fans updates out to subscribers
pub struct ReloadDispatcher {
    shared: Arc<Shared>,
    control: parking_lot::Mutex<Control>,
}

impl ReloadDispatcher {
    /// Dispatcher for `file_path` with default options and the notify source
    pub fn new(file_path: impl Into<PathBuf>) -> Self {
        let file_path = file_path.into();
        let loader: Arc<dyn DocumentLoader> = Arc::new(FileLoader::new(file_path.clone()));
        let source: Box<dyn EventSource> = Box::new(NotifySource::new(file_path.clone()));
        Self::from_parts(file_path, loader, Some(source), DispatcherOptions::default())
    }

    pub fn builder(file_path: impl Into<PathBuf>) -> DispatcherBuilder {
        DispatcherBuilder::new(file_path.into())
    }

    fn from_parts(
        file_path: PathBuf,
        loader: Arc<dyn DocumentLoader>,
        source: Option<Box<dyn EventSource>>,
        options: DispatcherOptions,
    ) -> Self {
        let (sink, receiver) = EventSink::channel(options.queue_capacity);
        let shared = Arc::new(Shared {
            file_path,
            loader,
            registry: SubscriptionRegistry::new(),
            state: AtomicU8::new(DispatcherState::Idle.as_u8()),
            version: AtomicU64::new(0),
            notifier: ReportNotifier::new(options.report_capacity),
            stats: DispatchStats::default(),
            options,
            dispatch_lock: Mutex::new(()),
            shutdown: Notify::new(),
        });

        Self {
            shared,
            control: parking_lot::Mutex::new(Control {
                source,
                sink: Some(sink),
                receiver: Some(receiver),
                worker: None,
            }),
        }
    }

    /// Register or replace a handler for the subtree at `path`
    ///
    /// Takes effect from the next dispatch that snapshots the registry.
    pub fn subscribe(
        &self,
        id: impl Into<String>,
        path: impl Into<ConfigPath>,
        handler: Arc<dyn ReloadHandler>,
    ) -> Result<(), DispatchError> {
        self.shared.registry.subscribe(id, path, handler)
    }

    pub fn subscribe_fn<F>(
        &self,
        id: impl Into<String>,
        path: impl Into<ConfigPath>,
        f: F,
    ) -> Result<(), DispatchError>
    where
        F: Fn(&ConfigUpdate) -> ReloadResult + Send + Sync + 'static,
    {
        self.subscribe(id, path, handler_fn(f))
    }

    /// Remove a subscription; returns whether it existed
    ///
    /// A dispatch already in flight may still invoke the handler.
    pub fn unsubscribe(&self, id: &str) -> bool {
        self.shared.registry.unsubscribe(id)
    }

    pub fn count(&self) -> usize {
        self.shared.registry.count()
    }

    pub fn subscription_ids(&self) -> Vec<String> {
        self.shared.registry.ids()
    }

    /// Bind the event source and start the dispatch worker
    ///
    /// Idempotent while watching. Must be called inside a tokio runtime.
    /// A stopped dispatcher cannot be restarted.
    pub fn start(&self) -> Result<(), DispatchError> {
        let mut guard = self.control.lock();
        match self.shared.state() {
            DispatcherState::Watching => return Ok(()),
            DispatcherState::Stopped => return Err(DispatchError::Stopped),
            DispatcherState::Idle => {}
        }

        let runtime = tokio::runtime::Handle::try_current().map_err(|_| DispatchError::NoRuntime)?;
        let control = &mut *guard;
        let sink = control.sink.clone().ok_or(DispatchError::QueueClosed)?;

        if let Some(source) = control.source.as_mut() {
            source.bind(sink.clone())?;
        }
        let receiver = control.receiver.take().ok_or(DispatchError::QueueClosed)?;

        self.shared
            .state
            .store(DispatcherState::Watching.as_u8(), Ordering::SeqCst);
        control.worker = Some(runtime.spawn(run_worker(Arc::clone(&self.shared), receiver)));

        if self.shared.options.dispatch_on_start {
            sink.emit(ChangeSignal::new(self.shared.file_path.clone(), SignalOrigin::Startup));
        }

        info!(
            file = %self.shared.file_path.display(),
            source = control.source.as_ref().map_or("manual", |s| s.source_type()),
            "Configuration watcher started"
        );
        Ok(())
    }

    /// Stop watching; idempotent and terminal
    ///
    /// The event source is unbound and future signals are ignored. A dispatch
    /// already running completes; the worker exits at the next event boundary.
    pub fn stop(&self) {
        let mut control = self.control.lock();
        let previous = DispatcherState::from_u8(
            self.shared
                .state
                .swap(DispatcherState::Stopped.as_u8(), Ordering::SeqCst),
        );
        if previous == DispatcherState::Stopped {
            return;
        }

        if let Some(source) = control.source.as_mut() {
            source.unbind();
        }
        control.sink = None;
        control.receiver = None;
        control.worker = None;
        self.shared.shutdown.notify_one();

        if previous == DispatcherState::Watching {
            info!(file = %self.shared.file_path.display(), "Configuration watcher stopped");
        }
    }

    pub fn is_watching(&self) -> bool {
        self.shared.state() == DispatcherState::Watching
    }

    pub fn state(&self) -> DispatcherState {
        self.shared.state()
    }

    /// Version of the most recent successful reparse; zero before the first
    pub fn version(&self) -> u64 {
        self.shared.version.load(Ordering::SeqCst)
    }

    /// Queue a manual change signal behind any pending file events
    ///
    /// Returns `Ok(false)` when the queue is full, in which case a queued
    /// signal already guarantees a later reparse.
    pub fn trigger(&self) -> Result<bool, DispatchError> {
        let control = self.control.lock();
        match self.shared.state() {
            DispatcherState::Watching => {}
            DispatcherState::Idle => return Err(DispatchError::NotWatching),
            DispatcherState::Stopped => return Err(DispatchError::Stopped),
        }
        let sink = control.sink.as_ref().ok_or(DispatchError::QueueClosed)?;
        Ok(sink.emit(ChangeSignal::new(self.shared.file_path.clone(), SignalOrigin::Manual)))
    }

    /// Run one dispatch now and return its report
    ///
    /// Allowed while idle or watching. Serialized with the worker, so handler
    /// invocations never overlap and versions stay monotonic.
    pub async fn dispatch_now(&self) -> Result<DispatchReport, DispatchError> {
        if self.shared.state() == DispatcherState::Stopped {
            return Err(DispatchError::Stopped);
        }
        Ok(self.shared.dispatch(SignalOrigin::Manual).await?)
    }

    /// Subscribe to dispatch reports and parse failures
    pub fn reports(&self) -> broadcast::Receiver<DispatchEvent> {
        self.shared.notifier.subscribe()
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.shared.stats.snapshot()
    }

    pub fn options(&self) -> &DispatcherOptions {
        &self.shared.options
    }

    pub fn file_path(&self) -> &Path {
        &self.shared.file_path
    }
}

impl Drop for ReloadDispatcher {
    fn drop(&mut self) {
        self.stop();
    }
}

impl fmt::Debug for ReloadDispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReloadDispatcher")
            .field("file_path", &self.shared.file_path)
            .field("state", &self.shared.state())
            .field("version", &self.version())
            .field("subscriptions", &self.count())
            .finish()
    }
}
