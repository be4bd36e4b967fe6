pub mod client;
pub mod models;
pub mod read;
pub mod scheduler;
pub mod sync;
pub mod time;
pub mod token;

pub use client::{CalendarProvider, GoogleCalendarClient};
pub use models::{CalendarEvent, CalendarSyncRecord, SyncStatus};
pub use scheduler::{SyncScheduler, TriggerOutcome};
pub use sync::{PassReport, SyncEngine, SyncRequest};

use crate::components::redis_service::CacheStore;
use crate::config::SyncSettings;
use crate::error::SyncResult;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::debug;

/// Calendar sync service: engine, scheduler and read path behind one handle.
///
/// Constructed once at startup and shared with whatever serves the read API.
/// `init` starts the background timer, `shutdown` stops it.
pub struct CalendarSync {
    engine: Arc<SyncEngine>,
    scheduler: SyncScheduler,
}

impl CalendarSync {
    pub fn new(
        provider: Arc<dyn CalendarProvider>,
        store: Arc<dyn CacheStore>,
        settings: &SyncSettings,
    ) -> Self {
        let engine = Arc::new(SyncEngine::new(provider, store, settings));
        let scheduler = SyncScheduler::new(Arc::clone(&engine), settings.trigger_debounce());
        Self { engine, scheduler }
    }

    /// Cached events in `[start, end]`, sorted by start.
    ///
    /// Returns immediately from cache. When the cache looks stale and a
    /// credential is loaded, a debounced background pass is triggered.
    pub async fn get_events(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Vec<CalendarEvent> {
        if self.is_stale().await && self.is_authorized().await {
            debug!("Calendar cache is stale, requesting background sync");
            let _ = self.scheduler.trigger(SyncRequest::scheduled());
        }
        read::events_in_range(self.engine.store().as_ref(), start, end).await
    }

    /// Request a pass now; `fresh` clears every stored token first
    pub fn trigger_sync(&self, fresh: bool) -> TriggerOutcome {
        self.scheduler.trigger(SyncRequest { fresh })
    }

    /// Run a pass and wait for it
    pub async fn sync_now(&self, fresh: bool) -> SyncResult<PassReport> {
        self.engine.run_pass(SyncRequest { fresh }).await
    }

    pub async fn is_authorized(&self) -> bool {
        self.engine.provider().is_authorized().await
    }

    pub async fn is_stale(&self) -> bool {
        self.scheduler.is_stale().await
    }

    pub async fn status(&self) -> SyncStatus {
        self.engine.status().await
    }

    pub fn sync_interval_minutes(&self) -> u64 {
        self.engine.interval().as_secs() / 60
    }

    pub async fn set_sync_interval_minutes(&self, minutes: u64) -> SyncResult<()> {
        self.scheduler.set_interval_minutes(minutes).await
    }

    pub async fn is_running(&self) -> bool {
        self.scheduler.is_running().await
    }
}

#[async_trait]
impl super::Component for CalendarSync {
    fn name(&self) -> &'static str {
        "calendar_sync"
    }

    async fn init(&self) -> SyncResult<()> {
        self.scheduler.start().await;
        Ok(())
    }

    async fn shutdown(&self) -> SyncResult<()> {
        self.scheduler.stop().await;
        Ok(())
    }
}
