//! Bundled reloadable components

pub mod logging;
pub mod middleware;
pub mod restart_required;

pub use logging::{
    init_logging, logging_subscriber, FilterHandle, LogFormat, LogSettings, LoggingHandle,
    ReloadableLogger, WriterFactory, LOG_PATH,
};
pub use middleware::{
    AccessLogSettings, CorsSettings, HealthSettings, MetricsSettings, MiddlewareSettings,
    PprofSettings, RecoverySettings, ReloadableMiddleware, RequestIdSettings, TimeoutSettings,
    MIDDLEWARE_PATH,
};
pub use restart_required::RestartRequired;
