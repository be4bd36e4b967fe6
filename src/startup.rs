use crate::components::google_calendar::token::TokenManager;
use crate::components::google_calendar::{CalendarProvider, GoogleCalendarClient};
use crate::components::redis_service::{CacheStore, InMemoryStore, RedisActor, RedisActorHandle};
use crate::components::{CalendarSync, ComponentManager};
use crate::config::Config;
use crate::error::{Error, SyncResult};
use crate::shutdown;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// Initialize logging with environment-based configuration
pub fn init_logging() -> miette::Result<()> {
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,redis=warn,reqwest=warn")),
        )
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| Error::Other(format!("Failed to set up logging: {}", e)))?;

    Ok(())
}

/// Load and initialize the application config
pub async fn load_config() -> miette::Result<Arc<RwLock<Config>>> {
    match Config::load() {
        Ok(config) => Ok(Arc::new(RwLock::new(config))),
        Err(e) => {
            error!("Failed to load configuration: {:?}", e);
            Err(e.into())
        }
    }
}

/// Pick the cache store: Redis when configured, in-memory otherwise
pub fn start_cache_store(config: &Config) -> (Arc<dyn CacheStore>, Option<RedisActorHandle>) {
    let Some(redis_url) = config.redis_url.as_deref() else {
        info!("REDIS_URL not set, caching calendars in memory");
        return (Arc::new(InMemoryStore::new()), None);
    };

    match RedisActor::new(redis_url) {
        Ok((mut redis_actor, redis_handle)) => {
            // Spawn Redis actor task
            tokio::spawn(async move {
                redis_actor.run().await;
            });
            (Arc::new(redis_handle.clone()), Some(redis_handle))
        }
        Err(e) => {
            error!("Failed to create Redis client: {}", e);
            warn!("Using in-memory cache as fallback");
            (Arc::new(InMemoryStore::new()), None)
        }
    }
}

/// Build the service, run it until a shutdown signal, then tear it down
pub async fn run(config: Arc<RwLock<Config>>) -> SyncResult<()> {
    let config = config.read().await.clone();

    let (store, redis_handle) = start_cache_store(&config);

    let tokens = Arc::new(TokenManager::new(&config));
    if !tokens.is_authorized().await {
        warn!("No calendar credential loaded, sync passes will report authorization required");
    }
    let provider: Arc<dyn CalendarProvider> = Arc::new(GoogleCalendarClient::new(&config, tokens));

    let calendar = Arc::new(CalendarSync::new(provider, store, &config.sync));

    let mut component_manager = ComponentManager::new();
    component_manager.register(calendar.clone());
    component_manager.init_all().await?;

    let result = serve(calendar, &config).await;
    if let Err(e) = &result {
        error!("Service stopped with error: {}", e);
    }

    // Teardown runs whether serving ended cleanly or not
    shutdown::teardown(&component_manager, redis_handle).await;

    result
}

#[cfg(feature = "web-interface")]
async fn serve(calendar: Arc<CalendarSync>, config: &Config) -> SyncResult<()> {
    let state = crate::server::AppState { calendar };
    crate::server::serve(state, config.http_port, shutdown::wait_for_signal()).await
}

#[cfg(not(feature = "web-interface"))]
async fn serve(_calendar: Arc<CalendarSync>, _config: &Config) -> SyncResult<()> {
    info!("Web interface disabled, running background sync only");
    shutdown::wait_for_signal().await;
    Ok(())
}
