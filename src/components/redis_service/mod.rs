mod actor;
mod memory;

pub use actor::{RedisActor, RedisActorHandle};
pub use memory::InMemoryStore;

use crate::components::google_calendar::models::CalendarSyncRecord;
use crate::error::SyncResult;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::time::Duration;

/// Cache key layout
pub mod keys {
    /// Prefix shared by every key this service owns
    pub const CALENDAR_PREFIX: &str = "calendar:";
    /// Completion time of the last pass over all calendars
    pub const LAST_FULL_SYNC: &str = "calendar:lastFullSync";

    /// Key of a calendar's sync record
    pub fn calendar_key(calendar_id: &str) -> String {
        format!("{}{}", CALENDAR_PREFIX, calendar_id)
    }

    /// Calendar id behind a record key, `None` for the marker or foreign keys
    pub fn calendar_id_from_key(key: &str) -> Option<&str> {
        if key == LAST_FULL_SYNC {
            return None;
        }
        key.strip_prefix(CALENDAR_PREFIX).filter(|id| !id.is_empty())
    }
}

/// Key-value store with per-key expiry holding the sync records
#[async_trait]
pub trait CacheStore: Send + Sync + 'static {
    /// Load a calendar's record
    async fn get_record(&self, calendar_id: &str) -> SyncResult<Option<CalendarSyncRecord>>;

    /// Store a calendar's record, resetting its expiry
    async fn put_record(&self, record: &CalendarSyncRecord, ttl: Duration) -> SyncResult<()>;

    /// Keys starting with `prefix`
    async fn list_keys(&self, prefix: &str) -> SyncResult<Vec<String>>;

    /// When the last complete pass finished
    async fn get_global_marker(&self) -> SyncResult<Option<DateTime<Utc>>>;

    /// Record the completion of a pass
    async fn set_global_marker(&self, at: DateTime<Utc>, ttl: Duration) -> SyncResult<()>;
}
