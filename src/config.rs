use crate::error::{config_error, env_error, Error, SyncResult};
use dotenvy::dotenv;
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::Path;
use std::time::Duration;

/// Default Google Calendar API base URL
pub const DEFAULT_API_BASE: &str = "https://www.googleapis.com/calendar/v3";
/// Default OAuth token endpoint
pub const DEFAULT_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
/// Default sync interval in minutes
pub const DEFAULT_SYNC_INTERVAL_MINUTES: u64 = 15;
/// Default cache entry lifetime in hours
pub const DEFAULT_CACHE_TTL_HOURS: u64 = 24;
/// Longest accepted sync interval, one week
pub const MAX_SYNC_INTERVAL_MINUTES: u64 = 7 * 24 * 60;
/// Longest accepted cache entry lifetime, thirty days
pub const MAX_CACHE_TTL_HOURS: u64 = 30 * 24;
/// Location of the optional sync settings overlay
pub const SYNC_SETTINGS_FILE: &str = "config/calendar_sync.toml";

/// Main configuration structure for the service
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Google Calendar API client ID
    pub google_client_id: String,
    /// Google Calendar API client secret
    pub google_client_secret: String,
    /// Refresh token handed over by the OAuth flow
    pub google_refresh_token: Option<String>,
    /// Optional access token to use until it is first refreshed
    pub google_access_token: Option<String>,
    /// Calendar API base URL
    pub google_api_base: String,
    /// OAuth token endpoint
    pub google_token_url: String,
    /// Redis connection URL, in-memory cache when unset
    pub redis_url: Option<String>,
    /// Port for the HTTP API
    pub http_port: u16,
    /// Sync engine settings
    pub sync: SyncSettings,
}

/// Settings for the sync engine and scheduler
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncSettings {
    /// Minutes between scheduled passes
    pub interval_minutes: u64,
    /// Hours a cache entry survives without being rewritten
    pub cache_ttl_hours: u64,
    /// Delay between calendars within one pass, in milliseconds
    pub calendar_delay_ms: u64,
    /// Longer delay applied before every Nth calendar, in milliseconds
    pub extended_delay_ms: u64,
    /// How often the longer delay applies
    pub extended_delay_every: usize,
    /// Seconds during which repeated on-demand triggers are ignored
    pub trigger_debounce_secs: u64,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            interval_minutes: DEFAULT_SYNC_INTERVAL_MINUTES,
            cache_ttl_hours: DEFAULT_CACHE_TTL_HOURS,
            calendar_delay_ms: 1_000,
            extended_delay_ms: 2_000,
            extended_delay_every: 5,
            trigger_debounce_secs: 60,
        }
    }
}

impl SyncSettings {
    /// Settings without inter-calendar delays
    pub fn without_delays() -> Self {
        Self {
            calendar_delay_ms: 0,
            extended_delay_ms: 0,
            ..Self::default()
        }
    }

    /// Scheduled pass interval
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_minutes.saturating_mul(60))
    }

    /// Lifetime of every cache entry
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_hours.saturating_mul(60 * 60))
    }

    /// Debounce window for on-demand triggers
    pub fn trigger_debounce(&self) -> Duration {
        Duration::from_secs(self.trigger_debounce_secs)
    }

    /// Reject settings the engine cannot run with
    pub fn validate(&self) -> SyncResult<()> {
        validate_interval_minutes(self.interval_minutes)?;
        if self.cache_ttl_hours == 0 {
            return Err(config_error("cache_ttl_hours must be at least 1"));
        }
        if self.cache_ttl_hours > MAX_CACHE_TTL_HOURS {
            return Err(Error::Config(format!(
                "cache_ttl_hours must be at most {}",
                MAX_CACHE_TTL_HOURS
            )));
        }
        if self.extended_delay_every == 0 {
            return Err(config_error("extended_delay_every must be at least 1"));
        }
        Ok(())
    }
}

/// Sync interval must be a whole number of minutes, at least one
pub fn validate_interval_minutes(minutes: u64) -> SyncResult<()> {
    if minutes < 1 {
        return Err(config_error("Sync interval must be at least 1 minute"));
    }
    if minutes > MAX_SYNC_INTERVAL_MINUTES {
        return Err(Error::Config(format!(
            "Sync interval must be at most {} minutes",
            MAX_SYNC_INTERVAL_MINUTES
        )));
    }
    Ok(())
}

impl Default for Config {
    fn default() -> Self {
        Self {
            google_client_id: String::new(),
            google_client_secret: String::new(),
            google_refresh_token: None,
            google_access_token: None,
            google_api_base: DEFAULT_API_BASE.to_string(),
            google_token_url: DEFAULT_TOKEN_URL.to_string(),
            redis_url: None,
            http_port: 3000,
            sync: SyncSettings::default(),
        }
    }
}

impl Config {
    /// Load configuration from environment and config file
    pub fn load() -> SyncResult<Self> {
        // Load .env file if it exists
        dotenv().ok();

        let google_client_id =
            env::var("GOOGLE_CLIENT_ID").map_err(|_| env_error("GOOGLE_CLIENT_ID"))?;
        let google_client_secret =
            env::var("GOOGLE_CLIENT_SECRET").map_err(|_| env_error("GOOGLE_CLIENT_SECRET"))?;

        let google_refresh_token = non_empty_var("GOOGLE_REFRESH_TOKEN");
        let google_access_token = non_empty_var("GOOGLE_ACCESS_TOKEN");
        let google_api_base =
            non_empty_var("GOOGLE_API_BASE").unwrap_or_else(|| DEFAULT_API_BASE.to_string());
        let google_token_url =
            non_empty_var("GOOGLE_TOKEN_URL").unwrap_or_else(|| DEFAULT_TOKEN_URL.to_string());
        let redis_url = non_empty_var("REDIS_URL");

        let http_port = match non_empty_var("PORT") {
            Some(port) => port
                .parse::<u16>()
                .map_err(|_| env_error("Invalid PORT format"))?,
            None => 3000,
        };

        // File overlay first, environment wins
        let mut sync = Self::load_sync_settings(Path::new(SYNC_SETTINGS_FILE))?;

        if let Some(minutes) = non_empty_var("SYNC_INTERVAL_MINUTES") {
            sync.interval_minutes = minutes
                .parse::<u64>()
                .map_err(|_| env_error("Invalid SYNC_INTERVAL_MINUTES format"))?;
        }
        if let Some(hours) = non_empty_var("CACHE_TTL_HOURS") {
            sync.cache_ttl_hours = hours
                .parse::<u64>()
                .map_err(|_| env_error("Invalid CACHE_TTL_HOURS format"))?;
        }

        sync.validate()?;

        Ok(Config {
            google_client_id,
            google_client_secret,
            google_refresh_token,
            google_access_token,
            google_api_base,
            google_token_url,
            redis_url,
            http_port,
            sync,
        })
    }

    /// Read the sync settings overlay, defaults when the file is missing
    pub fn load_sync_settings(path: &Path) -> SyncResult<SyncSettings> {
        match fs::read_to_string(path) {
            Ok(content) => Ok(toml::from_str::<SyncSettings>(&content)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(SyncSettings::default()),
            Err(e) => Err(e.into()),
        }
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|value| !value.trim().is_empty())
}
