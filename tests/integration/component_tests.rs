//! Bundled components driven through a dispatcher

use crate::common::{manual_dispatcher, ConfigFile, RetryService};
use hot_reload::components::{
    HealthSettings, LogSettings, MetricsSettings, MiddlewareSettings, PprofSettings,
    ReloadableLogger, ReloadableMiddleware, RestartRequired,
};
use hot_reload::core::reloadable::register;
use hot_reload::{OutcomeResult, ReloadErrorKind, ReloadStatus};
use parking_lot::Mutex;
use pretty_assertions::assert_eq;
use std::sync::Arc;
use std::time::Duration;

const MIDDLEWARE_YAML: &str = r#"
server:
  http:
    middleware:
      timeout:
        timeout: 5s
        skip-paths: ["/healthz"]
      request-id:
        header: X-Trace-ID
"#;

#[tokio::test]
async fn test_middleware_reload_notifies_callbacks() -> anyhow::Result<()> {
    let file = ConfigFile::yaml("server:\n  http: {}\n").await?;
    let dispatcher = manual_dispatcher(file.path());
    let middleware = Arc::new(ReloadableMiddleware::default());
    let timeouts = Arc::new(Mutex::new(Vec::new()));
    let recorded = Arc::clone(&timeouts);
    middleware.set_timeout_callback(move |timeout, skip_paths| {
        recorded.lock().push((timeout, skip_paths.to_vec()));
        Ok(())
    });
    middleware.register(&dispatcher, "middleware")?;

    file.write(MIDDLEWARE_YAML).await?;
    let report = dispatcher.dispatch_now().await?;

    assert!(report.is_clean());
    assert_eq!(middleware.timeout(), Duration::from_secs(5));
    assert_eq!(middleware.timeout_skip_paths(), vec!["/healthz".to_string()]);
    assert_eq!(middleware.request_id_header(), "X-Trace-ID");
    assert_eq!(
        *timeouts.lock(),
        vec![(Duration::from_secs(5), vec!["/healthz".to_string()])]
    );
    Ok(())
}

#[tokio::test]
async fn test_middleware_cors_failure_restores_timeout() -> anyhow::Result<()> {
    let file = ConfigFile::yaml("server:\n  http: {}\n").await?;
    let dispatcher = manual_dispatcher(file.path());
    let middleware = Arc::new(ReloadableMiddleware::default());
    let timeouts = Arc::new(Mutex::new(Vec::new()));
    let recorded = Arc::clone(&timeouts);
    middleware.set_timeout_callback(move |timeout, _| {
        recorded.lock().push(timeout);
        Ok(())
    });
    middleware.set_cors_callback(|_| anyhow::bail!("router refused CORS update"));
    middleware.register(&dispatcher, "middleware")?;

    file.write(
        r#"
server:
  http:
    middleware:
      timeout:
        timeout: 10s
      cors:
        allow-origins: ["https://app.example.com"]
"#,
    )
    .await?;
    let report = dispatcher.dispatch_now().await?;

    let outcome = report.outcome("middleware").expect("middleware outcome");
    assert_eq!(outcome.error().map(|e| e.kind()), Some(ReloadErrorKind::Apply));
    assert_eq!(middleware.timeout(), Duration::from_secs(30));
    assert_eq!(middleware.cors().allow_origins, vec!["*".to_string()]);
    assert_eq!(
        *timeouts.lock(),
        vec![Duration::from_secs(10), Duration::from_secs(30)]
    );
    Ok(())
}

#[tokio::test]
async fn test_middleware_reloads_observability_sections() -> anyhow::Result<()> {
    let file = ConfigFile::yaml("server:\n  http: {}\n").await?;
    let dispatcher = manual_dispatcher(file.path());
    let middleware = Arc::new(ReloadableMiddleware::default());
    middleware.register(&dispatcher, "middleware")?;

    file.write(
        r#"
server:
  http:
    middleware:
      health:
        path: /healthz
        liveness-path: /livez
        readiness-path: /readyz
      metrics:
        path: /prom
        namespace: edge
        subsystem: gateway
      pprof:
        block-profile-rate: 1
        mutex-profile-fraction: 10
"#,
    )
    .await?;
    let report = dispatcher.dispatch_now().await?;

    assert!(report.is_clean());
    assert_eq!(report.applied_count(), 1);
    assert_eq!(
        middleware.health(),
        HealthSettings {
            path: "/healthz".to_string(),
            liveness_path: "/livez".to_string(),
            readiness_path: "/readyz".to_string(),
        }
    );
    assert_eq!(
        middleware.metrics(),
        MetricsSettings {
            path: "/prom".to_string(),
            namespace: "edge".to_string(),
            subsystem: "gateway".to_string(),
        }
    );
    assert_eq!(
        middleware.pprof(),
        PprofSettings {
            block_profile_rate: 1,
            mutex_profile_fraction: 10,
        }
    );

    // Invalid values leave the previous settings live
    file.write("server:\n  http:\n    middleware:\n      pprof:\n        block-profile-rate: -1\n      health:\n        path: healthz\n")
        .await?;
    let report = dispatcher.dispatch_now().await?;
    assert!(!report.is_clean());
    assert_eq!(middleware.pprof().block_profile_rate, 1);
    assert_eq!(middleware.health().path, "/healthz");
    Ok(())
}

#[tokio::test]
async fn test_middleware_disable_flag_requires_restart() -> anyhow::Result<()> {
    let file = ConfigFile::yaml("server:\n  http: {}\n").await?;
    let dispatcher = manual_dispatcher(file.path());
    let middleware = Arc::new(ReloadableMiddleware::default());
    middleware.register(&dispatcher, "middleware")?;

    file.write("server:\n  http:\n    middleware:\n      disable-cors: true\n")
        .await?;
    let report = dispatcher.dispatch_now().await?;

    let error = report
        .outcome("middleware")
        .and_then(|o| o.error())
        .expect("middleware rejected the change");
    assert!(error.requires_restart());
    assert_eq!(middleware.settings(), MiddlewareSettings::default());
    Ok(())
}

#[tokio::test]
async fn test_logger_rejects_invalid_level() -> anyhow::Result<()> {
    let file = ConfigFile::yaml("log:\n  level: info\n").await?;
    let dispatcher = manual_dispatcher(file.path());
    let logger = Arc::new(ReloadableLogger::new(LogSettings::default()));
    logger.register(&dispatcher, "logger")?;

    file.write("log:\n  level: \"hot_reload=verbose\"\n").await?;
    let report = dispatcher.dispatch_now().await?;

    assert!(!report.is_clean());
    assert_eq!(logger.level(), "info");

    file.write("log:\n  level: debug\n  development: true\n").await?;
    dispatcher.dispatch_now().await?;
    assert_eq!(logger.level(), "debug");
    assert!(logger.is_development());
    Ok(())
}

#[tokio::test]
async fn test_restart_required_section() -> anyhow::Result<()> {
    let file = ConfigFile::yaml("server:\n  listen: \"0.0.0.0:8080\"\n").await?;
    let dispatcher = manual_dispatcher(file.path());
    let listen = Arc::new(RestartRequired::new(
        "listener",
        "server.listen",
        "0.0.0.0:8080".to_string(),
    ));
    register(&dispatcher, "listener", "server.listen", Arc::clone(&listen))?;

    let report = dispatcher.dispatch_now().await?;
    assert!(matches!(
        report.outcome("listener").map(|o| &o.result),
        Some(OutcomeResult::Succeeded(ReloadStatus::Unchanged))
    ));

    file.write("server:\n  listen: \"0.0.0.0:9090\"\n").await?;
    let report = dispatcher.dispatch_now().await?;

    let error = report
        .outcome("listener")
        .and_then(|o| o.error())
        .expect("listener rejected the change");
    assert_eq!(error.kind(), ReloadErrorKind::NotReloadable);
    assert_eq!(listen.get(), "0.0.0.0:8080");
    Ok(())
}

#[tokio::test]
async fn test_rollback_walks_history() -> anyhow::Result<()> {
    let file = ConfigFile::yaml("service:\n  max-retries: 3\n").await?;
    let dispatcher = manual_dispatcher(file.path());
    let service = RetryService::new("service", 3);
    let subscriber = register(&dispatcher, "retries", "service", Arc::clone(&service))?;

    file.write("service:\n  max-retries: 5\n").await?;
    dispatcher.dispatch_now().await?;
    file.write("service:\n  max-retries: 7\n").await?;
    dispatcher.dispatch_now().await?;
    assert_eq!(service.max_retries(), 7);

    subscriber.rollback_to_previous().await?;
    assert_eq!(service.max_retries(), 5);
    subscriber.rollback_to_previous().await?;
    assert_eq!(service.max_retries(), 3);
    assert!(subscriber.rollback_to_previous().await.is_err());
    assert_eq!(service.max_retries(), 3);
    Ok(())
}
