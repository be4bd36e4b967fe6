mod common;

use calsync::components::google_calendar::{SyncEngine, SyncRequest, SyncScheduler, TriggerOutcome};
use calsync::components::redis_service::{CacheStore, InMemoryStore};
use calsync::config::{SyncSettings, MAX_SYNC_INTERVAL_MINUTES};
use calsync::error::Error;
use chrono::{Duration as ChronoDuration, Utc};
use common::{Call, FakeProvider};
use std::sync::Arc;
use std::time::Duration;

fn scheduler(provider: &Arc<FakeProvider>, store: &Arc<InMemoryStore>) -> SyncScheduler {
    let settings = SyncSettings::without_delays();
    let engine = Arc::new(SyncEngine::new(provider.clone(), store.clone(), &settings));
    SyncScheduler::new(engine, settings.trigger_debounce())
}

fn list_calls(provider: &FakeProvider) -> usize {
    provider
        .calls()
        .into_iter()
        .filter(|call| *call == Call::ListCalendars)
        .count()
}

/// Let background tasks run until `provider` has seen `expected` passes
async fn wait_for_passes(provider: &FakeProvider, expected: usize) {
    for _ in 0..4000 {
        if list_calls(provider) >= expected {
            return;
        }
        tokio::time::sleep(Duration::from_millis(500)).await;
    }
    panic!("expected {} pass(es), saw {}", expected, list_calls(provider));
}

#[tokio::test]
async fn test_triggers_within_window_are_debounced() {
    let provider = FakeProvider::new();
    provider.add_calendar("work", vec![]);
    let store = Arc::new(InMemoryStore::new());
    let scheduler = scheduler(&provider, &store);

    let first = scheduler.trigger(SyncRequest::scheduled());
    assert!(first.is_started());
    let second = scheduler.trigger(SyncRequest::scheduled());
    assert!(!second.is_started());

    if let TriggerOutcome::Started(handle) = first {
        handle.await.unwrap();
    }
    assert_eq!(list_calls(&provider), 1);
}

#[tokio::test]
async fn test_fresh_trigger_bypasses_debounce() {
    let provider = FakeProvider::new();
    provider.add_calendar("work", vec![]);
    let store = Arc::new(InMemoryStore::new());
    let scheduler = scheduler(&provider, &store);

    assert!(scheduler.trigger(SyncRequest::scheduled()).is_started());
    assert!(scheduler.trigger(SyncRequest::fresh()).is_started());
}

#[tokio::test(start_paused = true)]
async fn test_trigger_allowed_again_after_window() {
    let provider = FakeProvider::new();
    provider.add_calendar("work", vec![]);
    let store = Arc::new(InMemoryStore::new());
    let scheduler = scheduler(&provider, &store);

    assert!(scheduler.trigger(SyncRequest::scheduled()).is_started());
    tokio::time::advance(Duration::from_secs(30)).await;
    assert!(!scheduler.trigger(SyncRequest::scheduled()).is_started());
    tokio::time::advance(Duration::from_secs(31)).await;
    assert!(scheduler.trigger(SyncRequest::scheduled()).is_started());
}

#[tokio::test]
async fn test_staleness_follows_marker() {
    let provider = FakeProvider::new();
    provider.add_calendar("work", vec![]);
    let store = Arc::new(InMemoryStore::new());
    let scheduler = scheduler(&provider, &store);

    // Cold cache
    assert!(scheduler.is_stale().await);

    match scheduler.trigger(SyncRequest::scheduled()) {
        TriggerOutcome::Started(handle) => {
            handle.await.unwrap()
        }
        other => panic!("expected a started pass, got {:?}", other),
    }
    assert!(!scheduler.is_stale().await);

    // Marker exactly one interval old counts as stale
    store
        .set_global_marker(
            Utc::now() - ChronoDuration::minutes(15),
            Duration::from_secs(3600),
        )
        .await
        .unwrap();
    assert!(scheduler.is_stale().await);
}

#[tokio::test]
async fn test_interval_must_be_positive() {
    let provider = FakeProvider::new();
    let store = Arc::new(InMemoryStore::new());
    let settings = SyncSettings::without_delays();
    let engine = Arc::new(SyncEngine::new(provider.clone(), store.clone(), &settings));
    let scheduler = SyncScheduler::new(engine.clone(), settings.trigger_debounce());

    let err = scheduler.set_interval_minutes(0).await.unwrap_err();
    assert!(matches!(err, Error::Config(_)));
    assert_eq!(engine.interval(), Duration::from_secs(15 * 60));

    scheduler.set_interval_minutes(5).await.unwrap();
    assert_eq!(engine.interval(), Duration::from_secs(5 * 60));
    assert!(!scheduler.is_running().await);
}

#[tokio::test(start_paused = true)]
async fn test_start_runs_first_pass_immediately() {
    let provider = FakeProvider::new();
    provider.add_calendar("work", vec![]);
    let store = Arc::new(InMemoryStore::new());
    let scheduler = scheduler(&provider, &store);

    scheduler.start().await;
    assert!(scheduler.is_running().await);

    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(list_calls(&provider), 1);
    assert!(store.get_record("work").await.unwrap().is_some());

    // Starting twice keeps the one timer
    scheduler.start().await;
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(list_calls(&provider), 1);

    scheduler.stop().await;
    assert!(!scheduler.is_running().await);
}

#[tokio::test(start_paused = true)]
async fn test_timer_repeats_on_interval() {
    let provider = FakeProvider::new();
    provider.add_calendar("work", vec![]);
    let store = Arc::new(InMemoryStore::new());
    let scheduler = scheduler(&provider, &store);

    scheduler.set_interval_minutes(1).await.unwrap();
    scheduler.start().await;
    wait_for_passes(&provider, 1).await;

    let started = tokio::time::Instant::now();
    wait_for_passes(&provider, 2).await;
    assert!(started.elapsed() >= Duration::from_secs(59));

    scheduler.stop().await;
    let passes = list_calls(&provider);
    tokio::time::sleep(Duration::from_secs(300)).await;
    assert_eq!(list_calls(&provider), passes);
}

#[tokio::test(start_paused = true)]
async fn test_interval_change_waits_full_period() {
    let provider = FakeProvider::new();
    provider.add_calendar("work", vec![]);
    let store = Arc::new(InMemoryStore::new());
    let scheduler = scheduler(&provider, &store);

    scheduler.start().await;
    wait_for_passes(&provider, 1).await;

    let changed_at = tokio::time::Instant::now();
    scheduler.set_interval_minutes(2).await.unwrap();
    assert!(scheduler.is_running().await);

    tokio::time::sleep(Duration::from_secs(90)).await;
    assert_eq!(list_calls(&provider), 1);

    wait_for_passes(&provider, 2).await;
    assert!(changed_at.elapsed() >= Duration::from_secs(120));

    scheduler.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_out_of_range_interval_keeps_timer_running() {
    let provider = FakeProvider::new();
    provider.add_calendar("work", vec![]);
    let store = Arc::new(InMemoryStore::new());
    let settings = SyncSettings::without_delays();
    let engine = Arc::new(SyncEngine::new(provider.clone(), store.clone(), &settings));
    let scheduler = SyncScheduler::new(engine.clone(), settings.trigger_debounce());

    scheduler.start().await;
    wait_for_passes(&provider, 1).await;

    for minutes in [MAX_SYNC_INTERVAL_MINUTES + 1, 200_000_000_000_000_000, u64::MAX] {
        let err = scheduler.set_interval_minutes(minutes).await.unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }
    assert!(scheduler.is_running().await);
    assert_eq!(engine.interval(), Duration::from_secs(15 * 60));

    // The original timer still fires on its old period
    wait_for_passes(&provider, 2).await;

    scheduler.set_interval_minutes(MAX_SYNC_INTERVAL_MINUTES).await.unwrap();
    assert!(scheduler.is_running().await);
    scheduler.stop().await;
}

#[tokio::test]
async fn test_trigger_during_running_pass_reports_in_progress() {
    let provider = FakeProvider::new();
    provider.add_calendar("work", vec![]);
    let store = Arc::new(InMemoryStore::new());
    let settings = SyncSettings::without_delays();
    let engine = Arc::new(SyncEngine::new(provider.clone(), store.clone(), &settings));
    let scheduler = SyncScheduler::new(engine.clone(), settings.trigger_debounce());

    let (entered, release) = provider.hold_calendar_list();
    let running = {
        let engine = engine.clone();
        tokio::spawn(async move { engine.run_pass(SyncRequest::scheduled()).await })
    };
    entered.notified().await;

    assert!(matches!(
        scheduler.trigger(SyncRequest::fresh()),
        TriggerOutcome::InProgress
    ));

    release.notify_one();
    running.await.unwrap().unwrap();

    // Nothing was recorded as a trigger, so the next one starts
    assert!(scheduler.trigger(SyncRequest::fresh()).is_started());
}
