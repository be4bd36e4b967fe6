use super::client::CalendarProvider;
use super::models::{
    CalendarEvent, CalendarInfo, CalendarSyncRecord, EventChange, ListMode, SyncStatus,
};
use super::time::full_sync_window;
use crate::components::redis_service::{keys, CacheStore};
use crate::config::{validate_interval_minutes, SyncSettings, DEFAULT_SYNC_INTERVAL_MINUTES};
use crate::error::{Error, SyncResult};
use chrono::{DateTime, Utc};
use std::sync::{Arc, RwLock as StdRwLock};
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

/// Status error shown when the credential is gone
pub const AUTHORIZATION_REQUIRED: &str = "authorization required";

/// What a pass was asked to do
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncRequest {
    /// Clear every stored token first, forcing full syncs
    pub fresh: bool,
}

impl SyncRequest {
    pub fn scheduled() -> Self {
        Self { fresh: false }
    }

    pub fn fresh() -> Self {
        Self { fresh: true }
    }
}

/// What happened to one calendar during a pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CalendarOutcome {
    /// Cache fresh enough, no network call made
    Unchanged,
    /// Events replaced from the full window
    Full,
    /// Changes merged from the stored token
    Incremental,
    /// Stored token expired, fell back to a full sync
    FullAfterExpiry,
}

impl CalendarOutcome {
    fn used_network(self) -> bool {
        !matches!(self, CalendarOutcome::Unchanged)
    }
}

/// Summary of one pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PassReport {
    /// Another pass was already running, nothing was done
    pub skipped: bool,
    pub full: usize,
    pub incremental: usize,
    pub unchanged: usize,
    pub failed: usize,
}

impl PassReport {
    fn skipped() -> Self {
        Self {
            skipped: true,
            ..Self::default()
        }
    }

    /// Whether any calendar ended the pass up to date
    pub fn any_current(&self) -> bool {
        self.failed == 0 || self.full + self.incremental + self.unchanged > 0
    }

    fn record(&mut self, outcome: CalendarOutcome) {
        match outcome {
            CalendarOutcome::Unchanged => self.unchanged += 1,
            CalendarOutcome::Full | CalendarOutcome::FullAfterExpiry => self.full += 1,
            CalendarOutcome::Incremental => self.incremental += 1,
        }
    }
}

/// Pause inserted between calendars to stay under provider rate limits
#[derive(Debug, Clone, Copy)]
pub struct RateLimit {
    pub delay: Duration,
    pub extended_delay: Duration,
    pub extended_every: usize,
}

impl RateLimit {
    pub fn none() -> Self {
        Self {
            delay: Duration::ZERO,
            extended_delay: Duration::ZERO,
            extended_every: 1,
        }
    }

    /// Delay before the next calendar once `synced` calendars hit the network this pass
    pub fn delay_after(&self, synced: usize) -> Duration {
        if synced > 0 && synced % self.extended_every.max(1) == 0 {
            self.extended_delay
        } else {
            self.delay
        }
    }
}

impl From<&SyncSettings> for RateLimit {
    fn from(settings: &SyncSettings) -> Self {
        Self {
            delay: Duration::from_millis(settings.calendar_delay_ms),
            extended_delay: Duration::from_millis(settings.extended_delay_ms),
            extended_every: settings.extended_delay_every,
        }
    }
}

/// Apply a provider delta to a calendar's event snapshot.
///
/// Removals drop the id, upserts replace by id or append. Applying the same
/// delta twice gives the same result as applying it once.
pub fn merge_changes(events: &mut Vec<CalendarEvent>, changes: Vec<EventChange>) {
    for change in changes {
        match change {
            EventChange::Removed { id } => events.retain(|event| event.id != id),
            EventChange::Upsert(updated) => {
                match events.iter_mut().find(|event| event.id == updated.id) {
                    Some(slot) => *slot = updated,
                    None => events.push(updated),
                }
            }
        }
    }
}

/// Stored interval, the default when the lock is poisoned
fn read_interval(interval: &StdRwLock<Duration>) -> Duration {
    interval
        .read()
        .map(|interval| *interval)
        .unwrap_or(Duration::from_secs(DEFAULT_SYNC_INTERVAL_MINUTES * 60))
}

/// Clears the in-progress flag on every exit path of a pass
struct InProgress<'a>(&'a StdRwLock<SyncStatus>);

impl Drop for InProgress<'_> {
    fn drop(&mut self) {
        if let Ok(mut status) = self.0.write() {
            status.sync_in_progress = false;
        }
    }
}

/// Keeps every calendar's cached record fresh relative to the provider
pub struct SyncEngine {
    provider: Arc<dyn CalendarProvider>,
    store: Arc<dyn CacheStore>,
    cache_ttl: Duration,
    rate_limit: RateLimit,
    interval: StdRwLock<Duration>,
    status: StdRwLock<SyncStatus>,
    pass_lock: Mutex<()>,
}

impl SyncEngine {
    pub fn new(
        provider: Arc<dyn CalendarProvider>,
        store: Arc<dyn CacheStore>,
        settings: &SyncSettings,
    ) -> Self {
        Self {
            provider,
            store,
            cache_ttl: settings.cache_ttl(),
            rate_limit: RateLimit::from(settings),
            interval: StdRwLock::new(settings.interval()),
            status: StdRwLock::new(SyncStatus::default()),
            pass_lock: Mutex::new(()),
        }
    }

    pub fn provider(&self) -> &Arc<dyn CalendarProvider> {
        &self.provider
    }

    pub fn store(&self) -> &Arc<dyn CacheStore> {
        &self.store
    }

    /// Current sync interval
    pub fn interval(&self) -> Duration {
        read_interval(&self.interval)
    }

    /// Change the sync interval, in whole minutes
    pub fn set_interval_minutes(&self, minutes: u64) -> SyncResult<()> {
        validate_interval_minutes(minutes)?;
        if let Ok(mut interval) = self.interval.write() {
            *interval = Duration::from_secs(minutes.saturating_mul(60));
        }
        Ok(())
    }

    /// Whether a pass is running right now
    pub fn is_syncing(&self) -> bool {
        self.status
            .read()
            .map(|status| status.sync_in_progress)
            .unwrap_or(false)
    }

    /// Status of the engine, falling back to the cached marker for `last_sync`
    pub async fn status(&self) -> SyncStatus {
        let mut status = self.status.read().map(|s| s.clone()).unwrap_or_default();
        if status.last_sync.is_none() {
            status.last_sync = self.global_marker().await;
        }
        status
    }

    /// Completion time of the last pass, `None` when unknown or the cache is down
    pub async fn global_marker(&self) -> Option<DateTime<Utc>> {
        match self.store.get_global_marker().await {
            Ok(marker) => marker,
            Err(e) => {
                warn!("Could not read last sync marker: {}", e);
                None
            }
        }
    }

    /// Run one pass over all calendars.
    ///
    /// Returns a skipped report when another pass holds the lock. Failing to
    /// enumerate calendars, or an authorization failure at any point, aborts the
    /// pass with an error; other per-calendar failures are counted and logged.
    pub async fn run_pass(&self, request: SyncRequest) -> SyncResult<PassReport> {
        let _guard = match self.pass_lock.try_lock() {
            Ok(guard) => guard,
            Err(_) => {
                info!("Calendar sync already in progress, skipping pass");
                return Ok(PassReport::skipped());
            }
        };

        if let Ok(mut status) = self.status.write() {
            status.sync_in_progress = true;
        }
        let _in_progress = InProgress(&self.status);

        let result = self.sync_all(request).await;

        let finished_at = Utc::now();
        let error = match &result {
            Ok(report) if report.failed > 0 => {
                Some(format!("{} calendar(s) failed to sync", report.failed))
            }
            Ok(_) => None,
            Err(e) if e.is_unauthorized() => Some(AUTHORIZATION_REQUIRED.to_string()),
            Err(e) => Some(e.to_string()),
        };

        if let Ok(mut status) = self.status.write() {
            if matches!(&result, Ok(report) if report.any_current()) {
                status.last_sync = Some(finished_at);
            }
            status.error = error;
        }

        match &result {
            Ok(report) => info!(
                "Calendar sync pass finished: {} full, {} incremental, {} unchanged, {} failed",
                report.full, report.incremental, report.unchanged, report.failed
            ),
            Err(e) => error!("Calendar sync pass aborted: {}", e),
        }

        result
    }

    async fn sync_all(&self, request: SyncRequest) -> SyncResult<PassReport> {
        if request.fresh {
            self.clear_sync_tokens().await;
        }

        let calendars = self.provider.list_calendars().await?;
        info!("Syncing {} calendar(s)", calendars.len());

        let mut report = PassReport::default();
        let mut synced = 0usize;

        for calendar in &calendars {
            let record = self.load_record(&calendar.id).await;

            if !self.needs_network(record.as_ref(), request) {
                debug!("Calendar {} is fresh, skipping", calendar.id);
                report.record(CalendarOutcome::Unchanged);
                continue;
            }

            if synced > 0 {
                let delay = self.rate_limit.delay_after(synced);
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
            }

            match self.sync_calendar(calendar, record).await {
                Ok(outcome) => {
                    if outcome.used_network() {
                        synced += 1;
                    }
                    report.record(outcome);
                }
                Err(e) if e.is_unauthorized() => return Err(e),
                Err(e) => {
                    synced += 1;
                    report.failed += 1;
                    warn!("Failed to sync calendar {}: {}", calendar.id, e);
                }
            }
        }

        // A pass where every calendar failed leaves the cache stale
        if !report.any_current() {
            warn!("Every calendar failed to sync, last sync marker left unchanged");
            return Ok(report);
        }

        if let Err(e) = self
            .store
            .set_global_marker(Utc::now(), self.cache_ttl)
            .await
        {
            warn!("Could not store last sync marker: {}", e);
        }

        Ok(report)
    }

    /// Whether the calendar has to be synced this pass
    fn needs_network(&self, record: Option<&CalendarSyncRecord>, request: SyncRequest) -> bool {
        let Some(record) = record else {
            return true;
        };
        if request.fresh || record.sync_token.is_none() {
            return true;
        }
        let age = Utc::now()
            .signed_duration_since(record.last_sync)
            .to_std()
            .unwrap_or(Duration::ZERO);
        age >= self.interval()
    }

    /// Sync one calendar that needs it, choosing full or incremental
    async fn sync_calendar(
        &self,
        calendar: &CalendarInfo,
        record: Option<CalendarSyncRecord>,
    ) -> SyncResult<CalendarOutcome> {
        let record = match record {
            Some(record) if record.sync_token.is_some() => record,
            _ => {
                self.full_sync(calendar).await?;
                return Ok(CalendarOutcome::Full);
            }
        };

        match self.incremental_sync(calendar, &record).await {
            Ok(()) => Ok(CalendarOutcome::Incremental),
            Err(Error::TokenExpired(_)) => {
                info!(
                    "Sync token for calendar {} expired, falling back to full sync",
                    calendar.id
                );
                match self.full_sync(calendar).await {
                    Ok(()) => Ok(CalendarOutcome::FullAfterExpiry),
                    Err(e) => {
                        // Keep the events but never the token known to be invalid
                        let mut stale = record;
                        stale.sync_token = None;
                        self.save_record(&stale).await;
                        Err(e)
                    }
                }
            }
            Err(e) => Err(e),
        }
    }

    /// Replace the calendar's events from the bounded window and store a fresh token
    async fn full_sync(&self, calendar: &CalendarInfo) -> SyncResult<()> {
        // Token first, so changes made while listing are replayed by the next delta
        let sync_token = match self.provider.fetch_sync_token(&calendar.id).await {
            Ok(token) => token,
            Err(e) if e.is_unauthorized() => return Err(e),
            Err(e) => {
                warn!(
                    "Could not obtain sync token for calendar {}, next sync will be full: {}",
                    calendar.id, e
                );
                None
            }
        };

        let now = Utc::now();
        let (time_min, time_max) = full_sync_window(now);
        let listing = self
            .provider
            .list_events(calendar, &ListMode::FullWindow { time_min, time_max })
            .await?;
        let events = listing.into_events();

        info!(
            "Full sync of calendar {}: {} event(s)",
            calendar.id,
            events.len()
        );

        let record = CalendarSyncRecord::new(calendar, sync_token, events, now);
        self.save_record(&record).await;
        Ok(())
    }

    /// Merge the changes since the stored token into the cached snapshot
    async fn incremental_sync(
        &self,
        calendar: &CalendarInfo,
        record: &CalendarSyncRecord,
    ) -> SyncResult<()> {
        let sync_token = record
            .sync_token
            .clone()
            .ok_or_else(|| Error::TokenExpired(calendar.id.clone()))?;

        let listing = self
            .provider
            .list_events(calendar, &ListMode::Incremental { sync_token: sync_token.clone() })
            .await?;

        let change_count = listing.changes.len();
        let mut events = record.events.clone();
        merge_changes(&mut events, listing.changes);

        debug!(
            "Incremental sync of calendar {}: {} change(s), {} event(s) cached",
            calendar.id,
            change_count,
            events.len()
        );

        let updated = CalendarSyncRecord::new(
            calendar,
            listing.next_sync_token.or(Some(sync_token)),
            events,
            Utc::now(),
        );
        self.save_record(&updated).await;
        Ok(())
    }

    /// Drop every stored token so the next pass does full syncs
    async fn clear_sync_tokens(&self) {
        let keys = match self.store.list_keys(keys::CALENDAR_PREFIX).await {
            Ok(keys) => keys,
            Err(e) => {
                warn!("Could not list cached calendars to clear tokens: {}", e);
                return;
            }
        };

        for calendar_id in keys.iter().filter_map(|key| keys::calendar_id_from_key(key)) {
            if let Some(mut record) = self.load_record(calendar_id).await {
                record.sync_token = None;
                self.save_record(&record).await;
            }
        }
        info!("Cleared stored sync tokens for a fresh sync");
    }

    /// Load a record, treating cache failures as absent
    async fn load_record(&self, calendar_id: &str) -> Option<CalendarSyncRecord> {
        match self.store.get_record(calendar_id).await {
            Ok(record) => record,
            Err(e) => {
                warn!("Could not read cache for calendar {}: {}", calendar_id, e);
                None
            }
        }
    }

    /// Store a record, logging and dropping failures
    async fn save_record(&self, record: &CalendarSyncRecord) {
        if let Err(e) = self.store.put_record(record, self.cache_ttl).await {
            warn!(
                "Could not cache calendar {}, result not persisted: {}",
                record.calendar_id, e
            );
        }
    }
}
