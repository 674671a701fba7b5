#![allow(dead_code)]

use anyhow::Result;
use async_trait::async_trait;
use hot_reload::core::reloadable::ensure;
use hot_reload::{
    ConfigUpdate, DispatchEvent, DispatchReport, LiveConfig, ReloadDispatcher, ReloadError,
    ReloadHandler, ReloadResult, ReloadStatus, ReloadableComponent,
};
use parking_lot::Mutex;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::fs;
use tokio::sync::broadcast;

/// Upper bound for anything that waits on a watcher or the worker task
pub const EVENT_TIMEOUT: Duration = Duration::from_secs(5);

/// A configuration file inside its own temporary directory
pub struct ConfigFile {
    _dir: TempDir,
    path: PathBuf,
}

impl ConfigFile {
    pub async fn new(name: &str, content: &str) -> Result<Self> {
        let dir = TempDir::new()?;
        let path = dir.path().join(name);
        fs::write(&path, content).await?;
        Ok(Self { _dir: dir, path })
    }

    pub async fn yaml(content: &str) -> Result<Self> {
        Self::new("config.yaml", content).await
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn write(&self, content: &str) -> Result<()> {
        fs::write(&self.path, content).await?;
        Ok(())
    }
}

/// Dispatcher with no event source; tests drive it with `dispatch_now`
pub fn manual_dispatcher(path: &Path) -> ReloadDispatcher {
    ReloadDispatcher::builder(path)
        .manual()
        .build()
        .expect("default options are valid")
}

/// Poll until `condition` holds or [`EVENT_TIMEOUT`] elapses
pub async fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + EVENT_TIMEOUT;
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    condition()
}

/// Next dispatch event, failing the test after [`EVENT_TIMEOUT`]
pub async fn next_event(receiver: &mut broadcast::Receiver<DispatchEvent>) -> DispatchEvent {
    tokio::time::timeout(EVENT_TIMEOUT, receiver.recv())
        .await
        .expect("timed out waiting for a dispatch event")
        .expect("report channel closed")
}

/// Next completed dispatch, skipping parse failures
pub async fn next_report(receiver: &mut broadcast::Receiver<DispatchEvent>) -> DispatchReport {
    loop {
        if let DispatchEvent::Completed(report) = next_event(receiver).await {
            return report;
        }
    }
}

/// Handler that records every delivery
#[derive(Default)]
pub struct RecordingHandler {
    calls: AtomicUsize,
    versions: Mutex<Vec<u64>>,
    absent: AtomicUsize,
}

impl RecordingHandler {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn versions(&self) -> Vec<u64> {
        self.versions.lock().clone()
    }

    pub fn absent_deliveries(&self) -> usize {
        self.absent.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ReloadHandler for RecordingHandler {
    async fn on_config_change(&self, update: &ConfigUpdate) -> ReloadResult {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.versions.lock().push(update.version());
        if update.is_absent() {
            self.absent.fetch_add(1, Ordering::SeqCst);
        }
        Ok(ReloadStatus::Applied)
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct RetryConfig {
    pub max_retries: i64,
}

/// Component that rejects negative retry counts
pub struct RetryService {
    name: String,
    live: LiveConfig<RetryConfig>,
}

impl RetryService {
    pub fn new(name: &str, max_retries: i64) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            live: LiveConfig::new(RetryConfig { max_retries }),
        })
    }

    pub fn max_retries(&self) -> i64 {
        self.live.read(|c| c.max_retries)
    }
}

#[async_trait]
impl ReloadableComponent for RetryService {
    type Config = RetryConfig;

    fn name(&self) -> &str {
        &self.name
    }

    fn live(&self) -> &LiveConfig<RetryConfig> {
        &self.live
    }

    fn validate(&self, config: &RetryConfig) -> Result<(), ReloadError> {
        ensure(config.max_retries >= 0, "max-retries", "must not be negative")
    }
}
