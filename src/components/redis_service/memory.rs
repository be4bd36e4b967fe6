use super::{keys, CacheStore};
use crate::components::google_calendar::models::CalendarSyncRecord;
use crate::error::SyncResult;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;

/// In-memory implementation of the cache (fallback without Redis, and tests).
///
/// Values are stored as JSON, same as in Redis.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    entries: RwLock<HashMap<String, (String, Instant)>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    async fn get_raw(&self, key: &str) -> Option<String> {
        let entries = self.entries.read().await;
        entries
            .get(key)
            .filter(|(_, expires_at)| *expires_at > Instant::now())
            .map(|(value, _)| value.clone())
    }

    async fn set_raw(&self, key: String, value: String, ttl: Duration) {
        let mut entries = self.entries.write().await;
        let now = Instant::now();
        entries.retain(|_, (_, expires_at)| *expires_at > now);
        // Clamp expiries past what the clock can represent
        let expires_at = now
            .checked_add(ttl)
            .unwrap_or_else(|| now + Duration::from_secs(60 * 60 * 24 * 365));
        entries.insert(key, (value, expires_at));
    }
}

#[async_trait]
impl CacheStore for InMemoryStore {
    async fn get_record(&self, calendar_id: &str) -> SyncResult<Option<CalendarSyncRecord>> {
        match self.get_raw(&keys::calendar_key(calendar_id)).await {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    async fn put_record(&self, record: &CalendarSyncRecord, ttl: Duration) -> SyncResult<()> {
        let json = serde_json::to_string(record)?;
        self.set_raw(keys::calendar_key(&record.calendar_id), json, ttl)
            .await;
        Ok(())
    }

    async fn list_keys(&self, prefix: &str) -> SyncResult<Vec<String>> {
        let entries = self.entries.read().await;
        let now = Instant::now();
        let mut keys: Vec<String> = entries
            .iter()
            .filter(|(key, (_, expires_at))| key.starts_with(prefix) && *expires_at > now)
            .map(|(key, _)| key.clone())
            .collect();
        keys.sort();
        Ok(keys)
    }

    async fn get_global_marker(&self) -> SyncResult<Option<DateTime<Utc>>> {
        match self.get_raw(keys::LAST_FULL_SYNC).await {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    async fn set_global_marker(&self, at: DateTime<Utc>, ttl: Duration) -> SyncResult<()> {
        let json = serde_json::to_string(&at)?;
        self.set_raw(keys::LAST_FULL_SYNC.to_string(), json, ttl).await;
        Ok(())
    }
}
