mod handlers;

use crate::components::CalendarSync;
use crate::error::SyncResult;
use axum::routing::get;
use axum::Router;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::info;

use handlers::{
    auth_handler, events_handler, get_interval_handler, health_handler, set_interval_handler,
    stale_handler, status_handler, sync_handler,
};

#[derive(Clone)]
pub struct AppState {
    /// Calendar sync service shared with the background scheduler
    pub calendar: Arc<CalendarSync>,
}

/// Build the HTTP router for the calendar API
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/api/calendar/events", get(events_handler))
        .route("/api/calendar/sync", axum::routing::post(sync_handler))
        .route("/api/calendar/status", get(status_handler))
        .route("/api/calendar/auth", get(auth_handler))
        .route("/api/calendar/stale", get(stale_handler))
        .route(
            "/api/calendar/interval",
            get(get_interval_handler).put(set_interval_handler),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve the calendar API until `shutdown` resolves
pub async fn serve(
    state: AppState,
    port: u16,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> SyncResult<()> {
    let addr = SocketAddr::from(([127, 0, 0, 1], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Listening on {}", addr);

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown)
        .await?;

    Ok(())
}
