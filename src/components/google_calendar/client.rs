use super::models::{CalendarEvent, CalendarInfo, EventChange, EventListing, ListMode};
use super::time::parse_event_time;
use super::token::TokenManager;
use crate::config::Config;
use crate::error::{provider_error, Error, SyncResult};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn};
use url::Url;

/// Most pages followed when listing calendars or events
pub const MAX_LIST_PAGES: usize = 20;
/// Most pages followed while paging for a sync token
pub const MAX_TOKEN_PAGES: usize = 20;
/// Event page size requested from the provider
const PAGE_SIZE: &str = "2500";
/// Calendar list page size, the provider's maximum
const CALENDAR_PAGE_SIZE: &str = "250";

/// Calendar provider operations the sync engine depends on
#[async_trait]
pub trait CalendarProvider: Send + Sync + 'static {
    /// List the user's calendars
    async fn list_calendars(&self) -> SyncResult<Vec<CalendarInfo>>;

    /// List a calendar's events, either incrementally or over a window
    async fn list_events(&self, calendar: &CalendarInfo, mode: &ListMode)
        -> SyncResult<EventListing>;

    /// Page through the unfiltered event set to obtain a fresh sync token
    async fn fetch_sync_token(&self, calendar_id: &str) -> SyncResult<Option<String>>;

    /// Whether a usable credential is loaded
    async fn is_authorized(&self) -> bool;
}

/// Google Calendar v3 client
pub struct GoogleCalendarClient {
    client: Client,
    tokens: Arc<TokenManager>,
    api_base: String,
}

impl GoogleCalendarClient {
    pub fn new(config: &Config, tokens: Arc<TokenManager>) -> Self {
        Self::with_api_base(config.google_api_base.clone(), tokens)
    }

    pub fn with_api_base(api_base: impl Into<String>, tokens: Arc<TokenManager>) -> Self {
        Self {
            client: Client::new(),
            tokens,
            api_base: api_base.into(),
        }
    }

    /// Build an API URL from path segments, escaping each one
    fn endpoint(&self, segments: &[&str]) -> SyncResult<Url> {
        let mut url = Url::parse(&self.api_base)
            .map_err(|e| provider_error(&format!("Failed to parse URL: {}", e)))?;
        url.path_segments_mut()
            .map_err(|_| provider_error("API base URL cannot have a path"))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    /// GET a JSON document, retrying once with a refreshed token on 401
    async fn get_json(&self, url: &Url, context: &str) -> SyncResult<Value> {
        let mut refreshed = false;
        loop {
            let access_token = self.tokens.access_token().await?;

            let response = self
                .client
                .get(url.clone())
                .bearer_auth(access_token)
                .send()
                .await
                .map_err(|e| provider_error(&format!("Failed to fetch {}: {}", context, e)))?;

            let status = response.status();
            if status == StatusCode::UNAUTHORIZED && !refreshed {
                debug!("Access token rejected while fetching {}, refreshing", context);
                self.tokens.invalidate_access_token().await;
                refreshed = true;
                continue;
            }

            if !status.is_success() {
                let error_body = response
                    .text()
                    .await
                    .unwrap_or_else(|_| "Could not read error response".to_string());
                return Err(classify_error(status, &error_body, context));
            }

            return response
                .json()
                .await
                .map_err(|e| provider_error(&format!("Failed to parse {} response: {}", context, e)));
        }
    }
}

#[async_trait]
impl CalendarProvider for GoogleCalendarClient {
    async fn list_calendars(&self) -> SyncResult<Vec<CalendarInfo>> {
        let mut calendars = Vec::new();
        let mut page_token: Option<String> = None;

        for _ in 0..MAX_LIST_PAGES {
            let mut url = self.endpoint(&["users", "me", "calendarList"])?;
            {
                let mut query = url.query_pairs_mut();
                query.append_pair("maxResults", CALENDAR_PAGE_SIZE);
                if let Some(token) = &page_token {
                    query.append_pair("pageToken", token);
                }
            }

            let page = self.get_json(&url, "calendar list").await?;
            if let Some(items) = page.get("items").and_then(|i| i.as_array()) {
                calendars.extend(items.iter().filter_map(parse_calendar_item));
            }

            page_token = next_page_token(&page);
            if page_token.is_none() {
                return Ok(calendars);
            }
        }

        warn!("Calendar list still paginated after {} pages, truncating", MAX_LIST_PAGES);
        Ok(calendars)
    }

    async fn list_events(
        &self,
        calendar: &CalendarInfo,
        mode: &ListMode,
    ) -> SyncResult<EventListing> {
        let mut listing = EventListing::default();
        let mut page_token: Option<String> = None;

        for _ in 0..MAX_LIST_PAGES {
            let mut url = self.endpoint(&["calendars", calendar.id.as_str(), "events"])?;
            {
                let mut query = url.query_pairs_mut();
                query.append_pair("maxResults", PAGE_SIZE);
                match mode {
                    // The provider refuses singleEvents together with a sync token
                    ListMode::Incremental { sync_token } => {
                        query.append_pair("syncToken", sync_token);
                    }
                    ListMode::FullWindow { time_min, time_max } => {
                        query.append_pair("timeMin", &time_min.to_rfc3339());
                        query.append_pair("timeMax", &time_max.to_rfc3339());
                        query.append_pair("singleEvents", "true");
                        query.append_pair("orderBy", "startTime");
                    }
                }
                if let Some(token) = &page_token {
                    query.append_pair("pageToken", token);
                }
            }

            let page = self.get_json(&url, &format!("events of {}", calendar.id)).await?;
            if let Some(items) = page.get("items").and_then(|i| i.as_array()) {
                listing
                    .changes
                    .extend(items.iter().filter_map(|item| parse_event_item(item, calendar)));
            }
            if let Some(token) = page.get("nextSyncToken").and_then(|t| t.as_str()) {
                listing.next_sync_token = Some(token.to_string());
            }

            page_token = next_page_token(&page);
            if page_token.is_none() {
                return Ok(listing);
            }
        }

        warn!(
            "Events of {} still paginated after {} pages, truncating",
            calendar.id, MAX_LIST_PAGES
        );
        Ok(listing)
    }

    async fn fetch_sync_token(&self, calendar_id: &str) -> SyncResult<Option<String>> {
        let mut page_token: Option<String> = None;

        for page_number in 1..=MAX_TOKEN_PAGES {
            let mut url = self.endpoint(&["calendars", calendar_id, "events"])?;
            {
                let mut query = url.query_pairs_mut();
                query.append_pair("maxResults", PAGE_SIZE);
                if let Some(token) = &page_token {
                    query.append_pair("pageToken", token);
                }
            }

            let page = self
                .get_json(&url, &format!("sync token of {}", calendar_id))
                .await?;

            page_token = next_page_token(&page);
            if page_token.is_none() {
                let sync_token = page
                    .get("nextSyncToken")
                    .and_then(|t| t.as_str())
                    .map(|t| t.to_string());
                debug!(
                    "Sync token for {} after {} page(s): {}",
                    calendar_id,
                    page_number,
                    sync_token.is_some()
                );
                return Ok(sync_token);
            }
        }

        warn!(
            "No sync token for {} within {} pages, next sync will be full",
            calendar_id, MAX_TOKEN_PAGES
        );
        Ok(None)
    }

    async fn is_authorized(&self) -> bool {
        self.tokens.is_authorized().await
    }
}

fn next_page_token(page: &Value) -> Option<String> {
    page.get("nextPageToken")
        .and_then(|t| t.as_str())
        .filter(|t| !t.is_empty())
        .map(|t| t.to_string())
}

/// Map a failed provider response onto the error taxonomy
pub fn classify_error(status: StatusCode, body: &str, context: &str) -> Error {
    if status == StatusCode::GONE || body.contains("fullSyncRequired") {
        return Error::TokenExpired(context.to_string());
    }
    if status == StatusCode::UNAUTHORIZED {
        return Error::Unauthorized(format!("Provider rejected credential for {}", context));
    }
    provider_error(&format!(
        "Failed to fetch {}: HTTP {} - {}",
        context, status, body
    ))
}

/// Parse one `calendarList` item
pub fn parse_calendar_item(item: &Value) -> Option<CalendarInfo> {
    let id = item.get("id").and_then(|id| id.as_str())?.to_string();
    let name = item
        .get("summaryOverride")
        .or_else(|| item.get("summary"))
        .and_then(|s| s.as_str())
        .unwrap_or(&id)
        .to_string();
    let text = |field: &str| item.get(field).and_then(|v| v.as_str()).map(|v| v.to_string());

    Some(CalendarInfo {
        id,
        name,
        color: text("backgroundColor"),
        access_role: text("accessRole"),
        time_zone: text("timeZone"),
    })
}

/// Parse one events item into a change.
///
/// Cancellation comes from the structured `status` field. Items without an id,
/// or live items whose times cannot be parsed, are dropped.
pub fn parse_event_item(item: &Value, calendar: &CalendarInfo) -> Option<EventChange> {
    let id = item.get("id").and_then(|id| id.as_str())?.to_string();

    if item.get("status").and_then(|s| s.as_str()) == Some("cancelled") {
        return Some(EventChange::Removed { id });
    }

    let (start, is_all_day) = match item.get("start").and_then(parse_event_time) {
        Some(start) => start,
        None => {
            debug!("Skipping event {} without a usable start time", id);
            return None;
        }
    };
    let end = item
        .get("end")
        .and_then(parse_event_time)
        .map(|(end, _)| end)
        .unwrap_or(start);

    let title = item
        .get("summary")
        .and_then(|s| s.as_str())
        .unwrap_or("(No title)")
        .to_string();

    Some(EventChange::Upsert(CalendarEvent {
        id,
        calendar_id: calendar.id.clone(),
        calendar_name: calendar.name.clone(),
        title,
        start,
        end,
        color: calendar.color.clone(),
        is_all_day,
    }))
}
