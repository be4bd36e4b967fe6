use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Snapshot of one provider event at sync time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CalendarEvent {
    pub id: String,
    pub calendar_id: String,
    pub calendar_name: String,
    pub title: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub color: Option<String>,
    pub is_all_day: bool,
}

impl CalendarEvent {
    /// Whether the event touches the inclusive range `[start, end]`
    pub fn overlaps(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> bool {
        self.start <= end && self.end >= start
    }
}

/// Cached state of one calendar, the unit of caching
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CalendarSyncRecord {
    pub calendar_id: String,
    pub calendar_name: String,
    /// Absent means the next sync must be a full sync
    pub sync_token: Option<String>,
    pub last_sync: DateTime<Utc>,
    /// Complete current snapshot, never a delta
    pub events: Vec<CalendarEvent>,
    pub color: Option<String>,
    pub time_zone: Option<String>,
    pub access_role: Option<String>,
}

impl CalendarSyncRecord {
    /// Build a record for a calendar from freshly fetched events
    pub fn new(
        calendar: &CalendarInfo,
        sync_token: Option<String>,
        events: Vec<CalendarEvent>,
        last_sync: DateTime<Utc>,
    ) -> Self {
        Self {
            calendar_id: calendar.id.clone(),
            calendar_name: calendar.name.clone(),
            sync_token,
            last_sync,
            events,
            color: calendar.color.clone(),
            time_zone: calendar.time_zone.clone(),
            access_role: calendar.access_role.clone(),
        }
    }
}

/// A calendar as listed by the provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CalendarInfo {
    pub id: String,
    pub name: String,
    pub color: Option<String>,
    pub access_role: Option<String>,
    pub time_zone: Option<String>,
}

/// One entry of a provider listing
#[derive(Debug, Clone, PartialEq)]
pub enum EventChange {
    /// New or changed event
    Upsert(CalendarEvent),
    /// Event cancelled or deleted upstream
    Removed { id: String },
}

/// Result of a provider event listing
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EventListing {
    pub changes: Vec<EventChange>,
    /// Token for the next incremental listing, when the provider issued one
    pub next_sync_token: Option<String>,
}

impl EventListing {
    /// Only the live events, dropping removal markers
    pub fn into_events(self) -> Vec<CalendarEvent> {
        self.changes
            .into_iter()
            .filter_map(|change| match change {
                EventChange::Upsert(event) => Some(event),
                EventChange::Removed { .. } => None,
            })
            .collect()
    }
}

/// How to list a calendar's events
#[derive(Debug, Clone, PartialEq)]
pub enum ListMode {
    /// Changes since the token, recurring series left unexpanded
    Incremental { sync_token: String },
    /// Every event in the window, recurring series expanded
    FullWindow {
        time_min: DateTime<Utc>,
        time_max: DateTime<Utc>,
    },
}

/// Sync state reported to the UI
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncStatus {
    pub last_sync: Option<DateTime<Utc>>,
    pub sync_in_progress: bool,
    pub error: Option<String>,
}
