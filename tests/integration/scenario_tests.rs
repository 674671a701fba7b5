//! End-to-end reload scenarios against real files

use crate::common::{
    manual_dispatcher, next_report, wait_until, ConfigFile, RecordingHandler, RetryService,
};
use hot_reload::components::{LogSettings, ReloadableLogger};
use hot_reload::core::reloadable::register;
use hot_reload::{
    DispatchError, DispatchEvent, DispatcherOptions, OutcomeResult, ReloadDispatcher,
    ReloadErrorKind, ReloadStatus, WatchMode,
};
use pretty_assertions::assert_eq;
use std::sync::Arc;
use std::time::Duration;

#[tokio::test]
async fn test_basic_reload_updates_log_level() -> anyhow::Result<()> {
    let file = ConfigFile::yaml("log:\n  level: info\n").await?;
    let dispatcher = manual_dispatcher(file.path());
    let logger = Arc::new(ReloadableLogger::new(LogSettings::default()));
    logger.register(&dispatcher, "logger")?;

    file.write("log:\n  level: debug\n").await?;
    let report = dispatcher.dispatch_now().await?;

    assert_eq!(logger.level(), "debug");
    assert_eq!(report.applied_count(), 1);
    assert_eq!(dispatcher.version(), 1);
    Ok(())
}

#[tokio::test]
async fn test_basic_reload_through_poll_watcher() -> anyhow::Result<()> {
    let file = ConfigFile::yaml("log:\n  level: info\n").await?;
    let options = DispatcherOptions {
        watch_mode: WatchMode::Poll,
        poll_interval_ms: 20,
        ..DispatcherOptions::default()
    };
    let dispatcher = ReloadDispatcher::builder(file.path()).options(options).build()?;
    let logger = Arc::new(ReloadableLogger::new(LogSettings::default()));
    logger.register(&dispatcher, "logger")?;
    let mut reports = dispatcher.reports();

    dispatcher.start()?;
    file.write("log:\n  level: debug\n").await?;

    let report = next_report(&mut reports).await;
    assert!(report.is_clean());
    assert!(wait_until(|| logger.level() == "debug").await);

    dispatcher.stop();
    Ok(())
}

#[tokio::test]
async fn test_rejected_update_keeps_live_value() -> anyhow::Result<()> {
    let file = ConfigFile::yaml("service:\n  max-retries: 3\n").await?;
    let dispatcher = manual_dispatcher(file.path());
    let service = RetryService::new("service", 3);
    register(&dispatcher, "retries", "service", Arc::clone(&service))?;
    let audit = RecordingHandler::new();
    dispatcher.subscribe("audit", "service", audit.clone())?;
    let mut reports = dispatcher.reports();

    file.write("service:\n  max-retries: -1\n").await?;
    let report = dispatcher.dispatch_now().await?;

    assert_eq!(service.max_retries(), 3);
    let rejected = report.outcome("retries").expect("retries outcome");
    assert_eq!(
        rejected.error().map(|e| e.kind()),
        Some(ReloadErrorKind::Validation)
    );
    assert!(report.outcome("audit").is_some_and(|o| o.is_success()));
    assert_eq!(audit.calls(), 1);

    // The published report carries exactly one failure for the subscription
    let published = next_report(&mut reports).await;
    let failures: Vec<_> = published.failed().map(|o| o.id.as_str()).collect();
    assert_eq!(failures, vec!["retries"]);
    assert_eq!(dispatcher.stats().handler_failures, 1);
    Ok(())
}

#[tokio::test]
async fn test_failure_is_isolated_across_subscribers() -> anyhow::Result<()> {
    let file = ConfigFile::yaml(
        "a:\n  max-retries: 1\nb:\n  max-retries: 1\nc:\n  max-retries: 1\n",
    )
    .await?;
    let dispatcher = manual_dispatcher(file.path());
    let a = RetryService::new("a", 1);
    let b = RetryService::new("b", 1);
    let c = RetryService::new("c", 1);
    register(&dispatcher, "a", "a", Arc::clone(&a))?;
    register(&dispatcher, "b", "b", Arc::clone(&b))?;
    register(&dispatcher, "c", "c", Arc::clone(&c))?;

    file.write("a:\n  max-retries: 2\nb:\n  max-retries: -5\nc:\n  max-retries: 3\n")
        .await?;
    let report = dispatcher.dispatch_now().await?;

    assert_eq!(a.max_retries(), 2);
    assert_eq!(b.max_retries(), 1);
    assert_eq!(c.max_retries(), 3);

    let order: Vec<_> = report.outcomes.iter().map(|o| o.id.as_str()).collect();
    assert_eq!(order, vec!["a", "b", "c"]);
    let failed: Vec<_> = report.failed().map(|o| o.id.as_str()).collect();
    assert_eq!(failed, vec!["b"]);
    Ok(())
}

#[tokio::test]
async fn test_resubscribe_replaces_handler() -> anyhow::Result<()> {
    let file = ConfigFile::yaml("x:\n  enabled: true\n").await?;
    let dispatcher = manual_dispatcher(file.path());
    let first = RecordingHandler::new();
    let second = RecordingHandler::new();

    dispatcher.subscribe("x", "x", first.clone())?;
    dispatcher.subscribe("x", "x", second.clone())?;
    assert_eq!(dispatcher.count(), 1);

    dispatcher.dispatch_now().await?;

    assert_eq!(first.calls(), 0);
    assert_eq!(second.calls(), 1);
    Ok(())
}

#[tokio::test]
async fn test_unsubscribed_component_keeps_last_state() -> anyhow::Result<()> {
    let file = ConfigFile::yaml("log:\n  level: info\n").await?;
    let dispatcher = manual_dispatcher(file.path());
    let logger = Arc::new(ReloadableLogger::new(LogSettings::default()));
    logger.register(&dispatcher, "logger")?;

    file.write("log:\n  level: debug\n").await?;
    dispatcher.dispatch_now().await?;
    assert_eq!(logger.level(), "debug");

    assert!(dispatcher.unsubscribe("logger"));
    file.write("log:\n  level: warn\n").await?;
    let report = dispatcher.dispatch_now().await?;

    assert!(report.outcomes.is_empty());
    assert_eq!(logger.level(), "debug");
    assert_eq!(dispatcher.version(), 2);
    Ok(())
}

#[tokio::test]
async fn test_parse_failure_skips_dispatch() -> anyhow::Result<()> {
    let file = ConfigFile::yaml("log:\n  level: info\n").await?;
    let dispatcher = manual_dispatcher(file.path());
    let handler = RecordingHandler::new();
    dispatcher.subscribe("logger", "log", handler.clone())?;
    let mut reports = dispatcher.reports();

    dispatcher.dispatch_now().await?;
    assert_eq!(dispatcher.version(), 1);
    let _ = next_report(&mut reports).await;

    // Truncated mid-write
    file.write("log:\n  level: [debug\n").await?;
    let err = dispatcher.dispatch_now().await.unwrap_err();
    assert!(matches!(err, DispatchError::Document(_)));
    assert_eq!(dispatcher.version(), 1);
    assert_eq!(handler.calls(), 1);

    match reports.recv().await? {
        DispatchEvent::ParseFailed { file: failed, .. } => assert_eq!(failed.as_path(), file.path()),
        other => panic!("expected a parse failure event, got {other:?}"),
    }

    file.write("log:\n  level: debug\n").await?;
    let report = dispatcher.dispatch_now().await?;
    assert_eq!(report.version, 2);
    assert_eq!(handler.versions(), vec![1, 2]);
    assert_eq!(dispatcher.stats().parse_failures, 1);
    Ok(())
}

#[tokio::test]
async fn test_empty_file_is_a_parse_failure() -> anyhow::Result<()> {
    let file = ConfigFile::yaml("log:\n  level: info\n").await?;
    let dispatcher = manual_dispatcher(file.path());
    let handler = RecordingHandler::new();
    dispatcher.subscribe("logger", "log", handler.clone())?;

    file.write("").await?;
    assert!(dispatcher.dispatch_now().await.is_err());
    assert_eq!(dispatcher.version(), 0);
    assert_eq!(handler.calls(), 0);
    Ok(())
}

#[tokio::test]
async fn test_empty_registry_still_bumps_version() -> anyhow::Result<()> {
    let file = ConfigFile::yaml("log:\n  level: info\n").await?;
    let dispatcher = manual_dispatcher(file.path());

    let report = dispatcher.dispatch_now().await?;

    assert!(report.outcomes.is_empty());
    assert_eq!(report.version, 1);
    Ok(())
}

#[tokio::test]
async fn test_missing_section_is_delivered_as_absent() -> anyhow::Result<()> {
    let file = ConfigFile::yaml("server:\n  port: 8080\n").await?;
    let dispatcher = manual_dispatcher(file.path());
    let handler = RecordingHandler::new();
    dispatcher.subscribe("raw", "cache.redis", handler.clone())?;
    let logger = Arc::new(ReloadableLogger::new(LogSettings::default()));
    logger.register(&dispatcher, "logger")?;

    let report = dispatcher.dispatch_now().await?;

    assert_eq!(handler.absent_deliveries(), 1);
    assert!(matches!(
        report.outcome("logger").map(|o| &o.result),
        Some(OutcomeResult::Succeeded(ReloadStatus::Skipped))
    ));
    assert_eq!(logger.level(), "info");
    Ok(())
}

#[tokio::test]
async fn test_rapid_edits_settle_on_last_content() -> anyhow::Result<()> {
    let file = ConfigFile::yaml("service:\n  max-retries: 0\n").await?;
    let options = DispatcherOptions::default().with_debounce(Duration::from_millis(300));
    let dispatcher = ReloadDispatcher::builder(file.path())
        .manual()
        .options(options)
        .build()?;
    let service = RetryService::new("service", 0);
    register(&dispatcher, "retries", "service", Arc::clone(&service))?;
    let mut reports = dispatcher.reports();
    dispatcher.start()?;

    for retries in 1..=5 {
        file.write(&format!("service:\n  max-retries: {retries}\n")).await?;
        dispatcher.trigger()?;
    }

    let report = next_report(&mut reports).await;
    assert_eq!(report.applied_count(), 1);
    assert_eq!(service.max_retries(), 5);
    assert_eq!(dispatcher.stats().coalesced_signals, 4);
    Ok(())
}

#[tokio::test]
async fn test_stop_during_debounce_window_discards_signal() -> anyhow::Result<()> {
    let file = ConfigFile::yaml("service:\n  max-retries: 0\n").await?;
    let options = DispatcherOptions::default().with_debounce(Duration::from_millis(300));
    let dispatcher = ReloadDispatcher::builder(file.path())
        .manual()
        .options(options)
        .build()?;
    let handler = RecordingHandler::new();
    dispatcher.subscribe("service", "service", handler.clone())?;
    dispatcher.start()?;

    assert!(dispatcher.trigger()?);
    tokio::time::sleep(Duration::from_millis(50)).await;
    dispatcher.stop();
    tokio::time::sleep(Duration::from_millis(600)).await;

    assert_eq!(handler.calls(), 0);
    assert_eq!(dispatcher.version(), 0);
    assert_eq!(dispatcher.stats().dispatches, 0);
    Ok(())
}
