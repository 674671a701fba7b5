//! Dispatcher lifecycle and event source wiring

use crate::common::{
    manual_dispatcher, next_event, next_report, wait_until, ConfigFile, RecordingHandler,
};
use hot_reload::{
    handler_fn, DispatchError, DispatchEvent, DispatcherOptions, DispatcherState, ManualSource,
    OutcomeResult, ReloadDispatcher, ReloadStatus, SignalOrigin,
};
use pretty_assertions::assert_eq;
use serde::Deserialize;
use std::sync::Arc;

#[tokio::test]
async fn test_file_write_triggers_dispatch() -> anyhow::Result<()> {
    let file = ConfigFile::yaml("feature:\n  enabled: false\n").await?;
    let dispatcher = ReloadDispatcher::new(file.path());
    let handler = RecordingHandler::new();
    dispatcher.subscribe("feature", "feature", handler.clone())?;
    let mut reports = dispatcher.reports();

    dispatcher.start()?;
    file.write("feature:\n  enabled: true\n").await?;

    let report = next_report(&mut reports).await;
    assert_eq!(report.origin, SignalOrigin::FileSystem);
    assert!(wait_until(|| handler.calls() >= 1).await);

    dispatcher.stop();
    Ok(())
}

#[tokio::test]
async fn test_trigger_is_processed_by_worker() -> anyhow::Result<()> {
    let file = ConfigFile::yaml("feature:\n  enabled: true\n").await?;
    let dispatcher = manual_dispatcher(file.path());
    let handler = RecordingHandler::new();
    dispatcher.subscribe("feature", "feature", handler.clone())?;
    let mut reports = dispatcher.reports();

    dispatcher.start()?;
    assert!(dispatcher.trigger()?);

    let report = next_report(&mut reports).await;
    assert_eq!(report.origin, SignalOrigin::Manual);
    assert_eq!(report.version, 1);
    assert_eq!(handler.calls(), 1);
    Ok(())
}

#[tokio::test]
async fn test_custom_source_feeds_dispatcher() -> anyhow::Result<()> {
    let file = ConfigFile::yaml("feature:\n  enabled: true\n").await?;
    let source = ManualSource::new(file.path());
    let trigger = source.trigger();
    let dispatcher = ReloadDispatcher::builder(file.path()).source(source).build()?;
    let mut reports = dispatcher.reports();

    assert!(!trigger.fire());
    dispatcher.start()?;
    assert!(trigger.is_bound());
    assert!(trigger.fire());

    let report = next_report(&mut reports).await;
    assert_eq!(report.version, 1);

    dispatcher.stop();
    assert!(!trigger.is_bound());
    assert!(!trigger.fire());
    assert_eq!(dispatcher.version(), 1);
    Ok(())
}

#[tokio::test]
async fn test_dispatch_on_start() -> anyhow::Result<()> {
    let file = ConfigFile::yaml("feature:\n  enabled: true\n").await?;
    let dispatcher = ReloadDispatcher::builder(file.path())
        .manual()
        .options(DispatcherOptions::default().with_dispatch_on_start(true))
        .build()?;
    let handler = RecordingHandler::new();
    dispatcher.subscribe("feature", "feature", handler.clone())?;
    let mut reports = dispatcher.reports();

    dispatcher.start()?;

    let report = next_report(&mut reports).await;
    assert_eq!(report.origin, SignalOrigin::Startup);
    assert_eq!(handler.versions(), vec![1]);
    Ok(())
}

#[tokio::test]
async fn test_lifecycle_errors() -> anyhow::Result<()> {
    let file = ConfigFile::yaml("feature:\n  enabled: true\n").await?;
    let dispatcher = manual_dispatcher(file.path());

    assert_eq!(dispatcher.state(), DispatcherState::Idle);
    assert!(matches!(dispatcher.trigger(), Err(DispatchError::NotWatching)));

    dispatcher.start()?;
    dispatcher.start()?;
    assert!(dispatcher.is_watching());

    dispatcher.stop();
    dispatcher.stop();
    assert_eq!(dispatcher.state(), DispatcherState::Stopped);
    assert!(matches!(dispatcher.start(), Err(DispatchError::Stopped)));
    assert!(matches!(dispatcher.trigger(), Err(DispatchError::Stopped)));
    assert!(matches!(dispatcher.dispatch_now().await, Err(DispatchError::Stopped)));
    Ok(())
}

#[test]
fn test_start_requires_runtime() {
    let dispatcher = ReloadDispatcher::builder("config.yaml").manual().build().unwrap();
    assert!(matches!(dispatcher.start(), Err(DispatchError::NoRuntime)));
    assert_eq!(dispatcher.state(), DispatcherState::Idle);
}

#[tokio::test]
async fn test_subscription_changes_apply_to_next_dispatch() -> anyhow::Result<()> {
    let file = ConfigFile::yaml("a: 1\nb: 2\n").await?;
    let dispatcher = manual_dispatcher(file.path());
    let a = RecordingHandler::new();
    dispatcher.subscribe("a", "a", a.clone())?;
    dispatcher.dispatch_now().await?;

    let b = RecordingHandler::new();
    dispatcher.subscribe("b", "b", b.clone())?;
    let report = dispatcher.dispatch_now().await?;

    assert_eq!(a.versions(), vec![1, 2]);
    assert_eq!(b.versions(), vec![2]);
    assert_eq!(dispatcher.subscription_ids(), vec!["a", "b"]);
    assert_eq!(report.outcomes.len(), 2);
    Ok(())
}

#[tokio::test]
async fn test_subscription_changes_during_dispatch_wait_for_next_dispatch() -> anyhow::Result<()> {
    let file = ConfigFile::yaml("a: 1\nc: 3\nz: 26\n").await?;
    let dispatcher = Arc::new(manual_dispatcher(file.path()));
    let c = RecordingHandler::new();
    let z = RecordingHandler::new();
    dispatcher.subscribe("c", "c", c.clone())?;

    let weak = Arc::downgrade(&dispatcher);
    let late = z.clone();
    dispatcher.subscribe_fn("a", "a", move |_| {
        if let Some(dispatcher) = weak.upgrade() {
            if !dispatcher.subscription_ids().contains(&"z".to_string()) {
                let _ = dispatcher.subscribe("z", "z", late.clone());
                dispatcher.unsubscribe("c");
            }
        }
        Ok(ReloadStatus::Applied)
    })?;

    let first = dispatcher.dispatch_now().await?;
    let ids: Vec<_> = first.outcomes.iter().map(|o| o.id.as_str()).collect();
    assert_eq!(ids, vec!["a", "c"]);
    assert_eq!(c.versions(), vec![1]);
    assert_eq!(z.calls(), 0);
    assert_eq!(dispatcher.subscription_ids(), vec!["a", "z"]);

    let second = dispatcher.dispatch_now().await?;
    let ids: Vec<_> = second.outcomes.iter().map(|o| o.id.as_str()).collect();
    assert_eq!(ids, vec!["a", "z"]);
    assert_eq!(c.versions(), vec![1]);
    assert_eq!(z.versions(), vec![2]);
    Ok(())
}

#[tokio::test]
async fn test_panicking_handler_does_not_stop_dispatch() -> anyhow::Result<()> {
    let file = ConfigFile::yaml("a: 1\nb: 2\n").await?;
    let dispatcher = manual_dispatcher(file.path());
    dispatcher.subscribe_fn("a", "a", |_| panic!("handler exploded"))?;
    let b = RecordingHandler::new();
    dispatcher.subscribe("b", "b", b.clone())?;

    let report = dispatcher.dispatch_now().await?;

    match &report.outcome("a").expect("outcome for a").result {
        OutcomeResult::Panicked(message) => assert!(message.contains("handler exploded")),
        other => panic!("expected a panic outcome, got {other:?}"),
    }
    assert_eq!(b.calls(), 1);
    assert_eq!(dispatcher.stats().handler_panics, 1);
    Ok(())
}

#[derive(Debug, Deserialize, PartialEq)]
#[serde(rename_all = "kebab-case")]
struct Pool {
    max_connections: u32,
}

#[tokio::test]
async fn test_json_and_toml_documents() -> anyhow::Result<()> {
    let json = ConfigFile::new("config.json", r#"{"db": {"pool": {"max-connections": 8}}}"#).await?;
    let toml = ConfigFile::new("config.toml", "[db.pool]\nmax-connections = 16\n").await?;

    for (file, expected) in [(&json, 8), (&toml, 16)] {
        let dispatcher = manual_dispatcher(file.path());
        let seen = Arc::new(parking_lot::Mutex::new(None));
        let sink = Arc::clone(&seen);
        dispatcher.subscribe(
            "pool",
            "db.pool",
            handler_fn(move |update| {
                *sink.lock() = update.decode::<Pool>()?;
                Ok(ReloadStatus::Applied)
            }),
        )?;

        dispatcher.dispatch_now().await?;
        assert_eq!(*seen.lock(), Some(Pool { max_connections: expected }));
    }
    Ok(())
}

#[tokio::test]
async fn test_events_serialize_for_reporting() -> anyhow::Result<()> {
    let file = ConfigFile::yaml("a: 1\n").await?;
    let dispatcher = manual_dispatcher(file.path());
    dispatcher.subscribe_fn("a", "a", |_| Ok(ReloadStatus::Unchanged))?;
    let mut reports = dispatcher.reports();

    dispatcher.dispatch_now().await?;

    let event = next_event(&mut reports).await;
    assert!(matches!(event, DispatchEvent::Completed(_)));
    let json = serde_json::to_value(&event)?;
    assert_eq!(json["event"], "completed");
    assert_eq!(json["version"], 1);
    assert_eq!(json["outcomes"][0]["id"], "a");
    Ok(())
}
