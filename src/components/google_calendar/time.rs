use chrono::{DateTime, Months, NaiveDate, Utc};
use serde_json::Value;

/// Months of history included in a full sync window
pub const WINDOW_MONTHS_BACK: u32 = 1;
/// Months of future included in a full sync window
pub const WINDOW_MONTHS_AHEAD: u32 = 3;

/// Bounds of the full sync window around `now`
pub fn full_sync_window(now: DateTime<Utc>) -> (DateTime<Utc>, DateTime<Utc>) {
    let time_min = now
        .checked_sub_months(Months::new(WINDOW_MONTHS_BACK))
        .unwrap_or(now);
    let time_max = now
        .checked_add_months(Months::new(WINDOW_MONTHS_AHEAD))
        .unwrap_or(now);
    (time_min, time_max)
}

/// Parse a provider `start`/`end` object.
///
/// Timed events carry `dateTime` (RFC 3339), all-day events carry `date`
/// (`YYYY-MM-DD`) which maps to midnight UTC. Returns the instant and whether
/// it came from an all-day date.
pub fn parse_event_time(value: &Value) -> Option<(DateTime<Utc>, bool)> {
    if let Some(date_time) = value.get("dateTime").and_then(|dt| dt.as_str()) {
        let parsed = DateTime::parse_from_rfc3339(date_time).ok()?;
        return Some((parsed.with_timezone(&Utc), false));
    }

    let date = value.get("date").and_then(|d| d.as_str())?;
    let date = NaiveDate::parse_from_str(date, "%Y-%m-%d").ok()?;
    let midnight = date.and_hms_opt(0, 0, 0)?;
    Some((midnight.and_utc(), true))
}
