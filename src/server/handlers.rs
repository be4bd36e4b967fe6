use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::info;

use super::AppState;
use crate::components::google_calendar::{CalendarEvent, SyncStatus, TriggerOutcome};
use crate::error::Error;

/// Error body returned to API callers
pub struct ApiError(StatusCode, String);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.0, Json(json!({ "error": self.1 }))).into_response()
    }
}

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        match err {
            Error::Config(message) => ApiError(StatusCode::BAD_REQUEST, message),
            other => ApiError(StatusCode::INTERNAL_SERVER_ERROR, other.to_string()),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct RangeParams {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

#[derive(Debug, Default, Deserialize)]
pub struct SyncParams {
    #[serde(default)]
    pub fresh: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct IntervalBody {
    pub minutes: u64,
}

/// Handler for health checks
pub async fn health_handler() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

/// Cached events in a date range
pub async fn events_handler(
    State(state): State<AppState>,
    Query(range): Query<RangeParams>,
) -> Result<Json<Vec<CalendarEvent>>, ApiError> {
    if range.start > range.end {
        return Err(ApiError(
            StatusCode::BAD_REQUEST,
            "start must not be after end".to_string(),
        ));
    }
    Ok(Json(state.calendar.get_events(range.start, range.end).await))
}

/// Trigger a background sync pass
pub async fn sync_handler(
    State(state): State<AppState>,
    Query(params): Query<SyncParams>,
) -> impl IntoResponse {
    let status = match state.calendar.trigger_sync(params.fresh) {
        TriggerOutcome::Started(_) => {
            info!("Calendar sync triggered via API (fresh: {})", params.fresh);
            "started"
        }
        TriggerOutcome::Debounced => "debounced",
        TriggerOutcome::InProgress => "in_progress",
    };
    (StatusCode::ACCEPTED, Json(json!({ "status": status })))
}

/// Sync status for display
pub async fn status_handler(State(state): State<AppState>) -> Json<SyncStatus> {
    Json(state.calendar.status().await)
}

/// Whether a provider credential is loaded
pub async fn auth_handler(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!({ "authorized": state.calendar.is_authorized().await }))
}

/// Whether the cache is older than the sync interval
pub async fn stale_handler(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!({ "stale": state.calendar.is_stale().await }))
}

/// Current sync interval
pub async fn get_interval_handler(State(state): State<AppState>) -> Json<IntervalBody> {
    Json(IntervalBody {
        minutes: state.calendar.sync_interval_minutes(),
    })
}

/// Change the sync interval
pub async fn set_interval_handler(
    State(state): State<AppState>,
    Json(body): Json<IntervalBody>,
) -> Result<Json<IntervalBody>, ApiError> {
    state
        .calendar
        .set_sync_interval_minutes(body.minutes)
        .await?;
    Ok(Json(IntervalBody {
        minutes: state.calendar.sync_interval_minutes(),
    }))
}
