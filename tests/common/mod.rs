#![allow(dead_code)]

use async_trait::async_trait;
use calsync::components::google_calendar::models::{
    CalendarEvent, CalendarInfo, EventChange, EventListing, ListMode,
};
use calsync::components::google_calendar::CalendarProvider;
use calsync::error::{Error, SyncResult};
use chrono::{DateTime, Duration, Utc};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;

/// Provider call recorded by the fake
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    ListCalendars,
    Token(String),
    Full(String),
    Incremental { calendar_id: String, sync_token: String },
}

/// Scripted answer to the next incremental listing of a calendar
#[derive(Debug, Clone)]
pub enum Delta {
    Changes(Vec<EventChange>),
    Expired,
    Network,
    Unauthorized,
}

/// In-memory calendar provider with call recording and scripted failures
#[derive(Default)]
pub struct FakeProvider {
    calendars: Mutex<Vec<CalendarInfo>>,
    events: Mutex<HashMap<String, Vec<CalendarEvent>>>,
    deltas: Mutex<HashMap<String, VecDeque<Delta>>>,
    failing_full: Mutex<HashSet<String>>,
    failing_tokens: Mutex<HashSet<String>>,
    calls: Mutex<Vec<Call>>,
    token_counter: AtomicUsize,
    unauthorized: AtomicBool,
    gate: Mutex<Option<(Arc<Notify>, Arc<Notify>)>>,
}

impl FakeProvider {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Add a calendar with the events its full listing returns
    pub fn add_calendar(&self, id: &str, events: Vec<CalendarEvent>) {
        self.calendars.lock().unwrap().push(calendar(id));
        self.events.lock().unwrap().insert(id.to_string(), events);
    }

    /// Replace what the next full listing of `id` returns
    pub fn set_events(&self, id: &str, events: Vec<CalendarEvent>) {
        self.events.lock().unwrap().insert(id.to_string(), events);
    }

    /// Queue the answer to the next incremental listing of `id`
    pub fn push_delta(&self, id: &str, delta: Delta) {
        self.deltas
            .lock()
            .unwrap()
            .entry(id.to_string())
            .or_default()
            .push_back(delta);
    }

    pub fn fail_full_sync(&self, id: &str) {
        self.failing_full.lock().unwrap().insert(id.to_string());
    }

    pub fn fail_token_fetch(&self, id: &str) {
        self.failing_tokens.lock().unwrap().insert(id.to_string());
    }

    pub fn revoke(&self) {
        self.unauthorized.store(true, Ordering::SeqCst);
    }

    /// Make `list_calendars` wait; returns (entered, release)
    pub fn hold_calendar_list(&self) -> (Arc<Notify>, Arc<Notify>) {
        let entered = Arc::new(Notify::new());
        let release = Arc::new(Notify::new());
        *self.gate.lock().unwrap() = Some((entered.clone(), release.clone()));
        (entered, release)
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().unwrap().clear();
    }

    /// Calls that reached an event endpoint
    pub fn event_calls(&self) -> Vec<Call> {
        self.calls()
            .into_iter()
            .filter(|call| *call != Call::ListCalendars)
            .collect()
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }

    fn next_token(&self, calendar_id: &str) -> String {
        let n = self.token_counter.fetch_add(1, Ordering::SeqCst) + 1;
        format!("{}-token-{}", calendar_id, n)
    }

    fn check_authorized(&self) -> SyncResult<()> {
        if self.unauthorized.load(Ordering::SeqCst) {
            return Err(Error::Unauthorized("credential revoked".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl CalendarProvider for FakeProvider {
    async fn list_calendars(&self) -> SyncResult<Vec<CalendarInfo>> {
        self.record(Call::ListCalendars);
        let gate = self.gate.lock().unwrap().take();
        if let Some((entered, release)) = gate {
            entered.notify_one();
            release.notified().await;
        }
        self.check_authorized()?;
        Ok(self.calendars.lock().unwrap().clone())
    }

    async fn list_events(
        &self,
        calendar: &CalendarInfo,
        mode: &ListMode,
    ) -> SyncResult<EventListing> {
        match mode {
            ListMode::FullWindow { .. } => {
                self.record(Call::Full(calendar.id.clone()));
                self.check_authorized()?;
                if self.failing_full.lock().unwrap().contains(&calendar.id) {
                    return Err(Error::Provider("HTTP 500".to_string()));
                }
                let events = self
                    .events
                    .lock()
                    .unwrap()
                    .get(&calendar.id)
                    .cloned()
                    .unwrap_or_default();
                Ok(EventListing {
                    changes: events.into_iter().map(EventChange::Upsert).collect(),
                    next_sync_token: None,
                })
            }
            ListMode::Incremental { sync_token } => {
                self.record(Call::Incremental {
                    calendar_id: calendar.id.clone(),
                    sync_token: sync_token.clone(),
                });
                self.check_authorized()?;
                let delta = self
                    .deltas
                    .lock()
                    .unwrap()
                    .get_mut(&calendar.id)
                    .and_then(|queue| queue.pop_front())
                    .unwrap_or(Delta::Changes(Vec::new()));
                match delta {
                    Delta::Changes(changes) => Ok(EventListing {
                        changes,
                        next_sync_token: Some(self.next_token(&calendar.id)),
                    }),
                    Delta::Expired => Err(Error::TokenExpired(calendar.id.clone())),
                    Delta::Network => Err(Error::Provider("connection reset".to_string())),
                    Delta::Unauthorized => {
                        Err(Error::Unauthorized("credential revoked".to_string()))
                    }
                }
            }
        }
    }

    async fn fetch_sync_token(&self, calendar_id: &str) -> SyncResult<Option<String>> {
        self.record(Call::Token(calendar_id.to_string()));
        self.check_authorized()?;
        if self.failing_tokens.lock().unwrap().contains(calendar_id) {
            return Err(Error::Provider("HTTP 503".to_string()));
        }
        Ok(Some(self.next_token(calendar_id)))
    }

    async fn is_authorized(&self) -> bool {
        !self.unauthorized.load(Ordering::SeqCst)
    }
}

pub fn calendar(id: &str) -> CalendarInfo {
    CalendarInfo {
        id: id.to_string(),
        name: format!("{} calendar", id),
        color: Some("#9fe1e7".to_string()),
        access_role: Some("owner".to_string()),
        time_zone: Some("Europe/Helsinki".to_string()),
    }
}

/// One-hour event starting `offset_hours` from now
pub fn event(calendar_id: &str, id: &str, title: &str, offset_hours: i64) -> CalendarEvent {
    let start = Utc::now() + Duration::hours(offset_hours);
    event_at(calendar_id, id, title, start, start + Duration::hours(1))
}

pub fn event_at(
    calendar_id: &str,
    id: &str,
    title: &str,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> CalendarEvent {
    CalendarEvent {
        id: id.to_string(),
        calendar_id: calendar_id.to_string(),
        calendar_name: format!("{} calendar", calendar_id),
        title: title.to_string(),
        start,
        end,
        color: Some("#9fe1e7".to_string()),
        is_all_day: false,
    }
}
