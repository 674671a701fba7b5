//! HTTP middleware settings with hot reload
//!
//! CORS, timeout, request-id, access-log, recovery, health, metrics and
//! pprof settings can change at runtime. Enabling or disabling a middleware changes the shape of the
//! handler chain and requires a restart.

use crate::core::dispatcher::ReloadDispatcher;
use crate::core::errors::{DispatchError, ReloadError};
use crate::core::reloadable::{
    ensure, ensure_unchanged, register, LiveConfig, ReloadableComponent, ReloadableSubscriber,
};
use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

pub const MIDDLEWARE_PATH: &str = "server.http.middleware";

const HTTP_METHODS: [&str; 9] = [
    "GET", "HEAD", "POST", "PUT", "PATCH", "DELETE", "OPTIONS", "CONNECT", "TRACE",
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct CorsSettings {
    pub allow_origins: Vec<String>,
    pub allow_methods: Vec<String>,
    pub allow_headers: Vec<String>,
    pub allow_credentials: bool,
    /// Seconds
    pub max_age: i64,
}

impl Default for CorsSettings {
    fn default() -> Self {
        Self {
            allow_origins: vec!["*".to_string()],
            allow_methods: ["GET", "POST", "PUT", "DELETE", "PATCH", "OPTIONS"]
                .map(String::from)
                .to_vec(),
            allow_headers: ["Origin", "Content-Type", "Accept", "Authorization"]
                .map(String::from)
                .to_vec(),
            allow_credentials: false,
            max_age: 86_400,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct TimeoutSettings {
    #[serde(with = "crate::core::document::duration")]
    pub timeout: Duration,
    pub skip_paths: Vec<String>,
}

impl Default for TimeoutSettings {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            skip_paths: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct RequestIdSettings {
    pub header: String,
}

impl Default for RequestIdSettings {
    fn default() -> Self {
        Self {
            header: "X-Request-ID".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct AccessLogSettings {
    pub skip_paths: Vec<String>,
    pub use_structured_logger: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct RecoverySettings {
    pub enable_stack_trace: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct HealthSettings {
    pub path: String,
    pub liveness_path: String,
    pub readiness_path: String,
}

impl Default for HealthSettings {
    fn default() -> Self {
        Self {
            path: "/health".to_string(),
            liveness_path: "/live".to_string(),
            readiness_path: "/ready".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct MetricsSettings {
    pub path: String,
    pub namespace: String,
    pub subsystem: String,
}

impl Default for MetricsSettings {
    fn default() -> Self {
        Self {
            path: "/metrics".to_string(),
            namespace: "hot_reload".to_string(),
            subsystem: "http".to_string(),
        }
    }
}

/// Runtime profiling rates; zero disables sampling
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct PprofSettings {
    pub block_profile_rate: i64,
    pub mutex_profile_fraction: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct MiddlewareSettings {
    pub disable_cors: bool,
    pub disable_timeout: bool,
    pub cors: CorsSettings,
    pub timeout: TimeoutSettings,
    pub request_id: RequestIdSettings,
    pub logger: AccessLogSettings,
    pub recovery: RecoverySettings,
    pub health: HealthSettings,
    pub metrics: MetricsSettings,
    pub pprof: PprofSettings,
}

impl MiddlewareSettings {
    pub fn validate(&self) -> Result<(), ReloadError> {
        if !self.disable_timeout {
            ensure(
                !self.timeout.timeout.is_zero(),
                "timeout.timeout",
                "must be greater than zero",
            )?;
        }
        validate_paths(&self.timeout.skip_paths, "timeout.skip-paths")?;
        validate_paths(&self.logger.skip_paths, "logger.skip-paths")?;
        validate_paths(
            &[
                self.health.path.clone(),
                self.health.liveness_path.clone(),
                self.health.readiness_path.clone(),
            ],
            "health",
        )?;
        validate_paths(std::slice::from_ref(&self.metrics.path), "metrics.path")?;
        ensure(
            self.pprof.block_profile_rate >= 0,
            "pprof.block-profile-rate",
            "must not be negative",
        )?;
        ensure(
            self.pprof.mutex_profile_fraction >= 0,
            "pprof.mutex-profile-fraction",
            "must not be negative",
        )?;

        if !self.disable_cors {
            for method in &self.cors.allow_methods {
                ensure(
                    HTTP_METHODS.contains(&method.to_ascii_uppercase().as_str()),
                    "cors.allow-methods",
                    format!("unknown HTTP method {method:?}"),
                )?;
            }
            ensure(self.cors.max_age >= 0, "cors.max-age", "must not be negative")?;
            ensure(
                !(self.cors.allow_credentials && self.cors.allow_origins.iter().any(|o| o == "*")),
                "cors.allow-credentials",
                "cannot be combined with a wildcard origin",
            )?;
        }

        ensure(
            is_header_token(&self.request_id.header),
            "request-id.header",
            format!("{:?} is not a valid header name", self.request_id.header),
        )
    }

    /// Names of the hot-reloadable fields that differ, for logging
    fn changed_fields(&self, next: &Self) -> Vec<&'static str> {
        let mut changes = Vec::new();
        if self.cors.allow_origins != next.cors.allow_origins {
            changes.push("cors.allow-origins");
        }
        if self.cors.allow_methods != next.cors.allow_methods {
            changes.push("cors.allow-methods");
        }
        if self.cors.allow_headers != next.cors.allow_headers {
            changes.push("cors.allow-headers");
        }
        if self.cors.allow_credentials != next.cors.allow_credentials {
            changes.push("cors.allow-credentials");
        }
        if self.cors.max_age != next.cors.max_age {
            changes.push("cors.max-age");
        }
        if self.timeout.timeout != next.timeout.timeout {
            changes.push("timeout.timeout");
        }
        if self.timeout.skip_paths != next.timeout.skip_paths {
            changes.push("timeout.skip-paths");
        }
        if self.request_id != next.request_id {
            changes.push("request-id.header");
        }
        if self.logger != next.logger {
            changes.push("logger");
        }
        if self.recovery != next.recovery {
            changes.push("recovery.enable-stack-trace");
        }
        if self.health.path != next.health.path {
            changes.push("health.path");
        }
        if self.health.liveness_path != next.health.liveness_path {
            changes.push("health.liveness-path");
        }
        if self.health.readiness_path != next.health.readiness_path {
            changes.push("health.readiness-path");
        }
        if self.metrics.path != next.metrics.path {
            changes.push("metrics.path");
        }
        if self.metrics.namespace != next.metrics.namespace {
            changes.push("metrics.namespace");
        }
        if self.metrics.subsystem != next.metrics.subsystem {
            changes.push("metrics.subsystem");
        }
        if self.pprof.block_profile_rate != next.pprof.block_profile_rate {
            changes.push("pprof.block-profile-rate");
        }
        if self.pprof.mutex_profile_fraction != next.pprof.mutex_profile_fraction {
            changes.push("pprof.mutex-profile-fraction");
        }
        changes
    }
}

fn validate_paths(paths: &[String], field: &str) -> Result<(), ReloadError> {
    for path in paths {
        ensure(path.starts_with('/'), field, format!("{path:?} must start with '/'"))?;
    }
    Ok(())
}

fn is_header_token(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "!#$%&'*+-.^_`|~".contains(c))
}

pub type TimeoutCallback = Box<dyn Fn(Duration, &[String]) -> anyhow::Result<()> + Send + Sync>;
pub type CorsCallback = Box<dyn Fn(&CorsSettings) -> anyhow::Result<()> + Send + Sync>;

/// Middleware settings shared with the HTTP stack
///
/// Callbacks run during commit and must not call back into this component.
pub struct ReloadableMiddleware {
    live: LiveConfig<MiddlewareSettings>,
    on_timeout_change: RwLock<Option<TimeoutCallback>>,
    on_cors_change: RwLock<Option<CorsCallback>>,
}

impl ReloadableMiddleware {
    pub fn new(settings: MiddlewareSettings) -> Self {
        Self {
            live: LiveConfig::new(settings),
            on_timeout_change: RwLock::new(None),
            on_cors_change: RwLock::new(None),
        }
    }

    pub fn set_timeout_callback<F>(&self, callback: F)
    where
        F: Fn(Duration, &[String]) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        *self.on_timeout_change.write() = Some(Box::new(callback));
    }

    pub fn set_cors_callback<F>(&self, callback: F)
    where
        F: Fn(&CorsSettings) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        *self.on_cors_change.write() = Some(Box::new(callback));
    }

    pub fn settings(&self) -> MiddlewareSettings {
        self.live.get()
    }

    pub fn cors(&self) -> CorsSettings {
        self.live.read(|s| s.cors.clone())
    }

    pub fn timeout(&self) -> Duration {
        self.live.read(|s| s.timeout.timeout)
    }

    pub fn timeout_skip_paths(&self) -> Vec<String> {
        self.live.read(|s| s.timeout.skip_paths.clone())
    }

    pub fn request_id_header(&self) -> String {
        self.live.read(|s| s.request_id.header.clone())
    }

    pub fn enable_stack_trace(&self) -> bool {
        self.live.read(|s| s.recovery.enable_stack_trace)
    }

    pub fn health(&self) -> HealthSettings {
        self.live.read(|s| s.health.clone())
    }

    pub fn metrics(&self) -> MetricsSettings {
        self.live.read(|s| s.metrics.clone())
    }

    pub fn pprof(&self) -> PprofSettings {
        self.live.read(|s| s.pprof.clone())
    }

    /// Subscribe to `dispatcher` at `server.http.middleware`
    pub fn register(
        self: &Arc<Self>,
        dispatcher: &ReloadDispatcher,
        id: &str,
    ) -> Result<Arc<ReloadableSubscriber<Self>>, DispatchError> {
        register(dispatcher, id, MIDDLEWARE_PATH, Arc::clone(self))
    }

    fn notify_timeout(&self, settings: &TimeoutSettings) -> anyhow::Result<()> {
        match self.on_timeout_change.read().as_ref() {
            Some(callback) => callback(settings.timeout, &settings.skip_paths),
            None => Ok(()),
        }
    }

    fn notify_cors(&self, settings: &CorsSettings) -> anyhow::Result<()> {
        match self.on_cors_change.read().as_ref() {
            Some(callback) => callback(settings),
            None => Ok(()),
        }
    }
}

impl Default for ReloadableMiddleware {
    fn default() -> Self {
        Self::new(MiddlewareSettings::default())
    }
}

#[async_trait]
impl ReloadableComponent for ReloadableMiddleware {
    type Config = MiddlewareSettings;

    fn name(&self) -> &str {
        "middleware"
    }

    fn live(&self) -> &LiveConfig<MiddlewareSettings> {
        &self.live
    }

    fn validate(&self, config: &MiddlewareSettings) -> Result<(), ReloadError> {
        config.validate()
    }

    fn check_reloadable(
        &self,
        current: &MiddlewareSettings,
        next: &MiddlewareSettings,
    ) -> Result<(), ReloadError> {
        ensure_unchanged(&current.disable_cors, &next.disable_cors, "server.http.middleware.disable-cors")?;
        ensure_unchanged(
            &current.disable_timeout,
            &next.disable_timeout,
            "server.http.middleware.disable-timeout",
        )
    }

    async fn commit(&self, previous: &MiddlewareSettings, next: &MiddlewareSettings) -> anyhow::Result<()> {
        let timeout_changed = !next.disable_timeout && previous.timeout != next.timeout;
        let cors_changed = !next.disable_cors && previous.cors != next.cors;

        if timeout_changed {
            self.notify_timeout(&next.timeout)?;
        }

        if cors_changed {
            if let Err(e) = self.notify_cors(&next.cors) {
                if timeout_changed {
                    if let Err(undo) = self.notify_timeout(&previous.timeout) {
                        warn!(error = %undo, "Failed to restore previous timeout settings");
                    }
                }
                return Err(e.context("CORS change rejected"));
            }
        }

        let changes = previous.changed_fields(next);
        if changes.is_empty() {
            debug!("Middleware configuration unchanged");
        } else {
            info!(changes = ?changes, "Middleware configuration reloaded");
        }
        Ok(())
    }
}
