use super::models::CalendarEvent;
use crate::components::redis_service::{keys, CacheStore};
use chrono::{DateTime, Utc};
use tracing::warn;

/// Cached events overlapping `[start, end]` across every calendar, sorted by start.
///
/// Never touches the provider. A missing or unreachable cache yields an empty list.
pub async fn events_in_range(
    store: &dyn CacheStore,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> Vec<CalendarEvent> {
    let cached_keys = match store.list_keys(keys::CALENDAR_PREFIX).await {
        Ok(keys) => keys,
        Err(e) => {
            warn!("Could not list cached calendars: {}", e);
            return Vec::new();
        }
    };

    let mut events = Vec::new();
    for calendar_id in cached_keys.iter().filter_map(|key| keys::calendar_id_from_key(key)) {
        match store.get_record(calendar_id).await {
            Ok(Some(record)) => events.extend(
                record
                    .events
                    .into_iter()
                    .filter(|event| event.overlaps(start, end)),
            ),
            Ok(None) => {}
            Err(e) => warn!("Could not read cached calendar {}: {}", calendar_id, e),
        }
    }

    events.sort_by(|a, b| a.start.cmp(&b.start));
    events
}
