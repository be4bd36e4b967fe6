use super::{keys, CacheStore};
use crate::components::google_calendar::models::CalendarSyncRecord;
use crate::error::{cache_error, SyncResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client as RedisClient};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

/// The Redis actor that processes messages
pub struct RedisActor {
    client: RedisClient,
    connection: Option<ConnectionManager>,
    command_rx: mpsc::Receiver<RedisCommand>,
}

/// Commands that can be sent to the Redis actor
pub enum RedisCommand {
    Get(String, oneshot::Sender<SyncResult<Option<String>>>),
    SetEx(String, String, Duration, oneshot::Sender<SyncResult<()>>),
    Keys(String, oneshot::Sender<SyncResult<Vec<String>>>),
    Shutdown,
}

/// Handle for communicating with the Redis actor
#[derive(Clone)]
pub struct RedisActorHandle {
    command_tx: mpsc::Sender<RedisCommand>,
}

impl RedisActorHandle {
    /// Create a handle with no actor behind it; every call reports the cache unavailable
    pub fn empty() -> Self {
        let (command_tx, _) = mpsc::channel(32);
        Self { command_tx }
    }

    async fn request<T>(
        &self,
        command: impl FnOnce(oneshot::Sender<SyncResult<T>>) -> RedisCommand,
    ) -> SyncResult<T> {
        let (response_tx, response_rx) = oneshot::channel();
        self.command_tx
            .send(command(response_tx))
            .await
            .map_err(|e| cache_error(&format!("Actor mailbox error: {}", e)))?;

        response_rx
            .await
            .map_err(|_| cache_error("Response channel closed"))?
    }

    async fn get(&self, key: String) -> SyncResult<Option<String>> {
        self.request(|tx| RedisCommand::Get(key, tx)).await
    }

    async fn set_ex(&self, key: String, value: String, ttl: Duration) -> SyncResult<()> {
        self.request(|tx| RedisCommand::SetEx(key, value, ttl, tx))
            .await
    }

    /// Shutdown the actor, dropping its connection
    pub async fn shutdown(&self) -> SyncResult<()> {
        let _ = self.command_tx.send(RedisCommand::Shutdown).await;
        Ok(())
    }
}

#[async_trait]
impl CacheStore for RedisActorHandle {
    async fn get_record(&self, calendar_id: &str) -> SyncResult<Option<CalendarSyncRecord>> {
        match self.get(keys::calendar_key(calendar_id)).await? {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    async fn put_record(&self, record: &CalendarSyncRecord, ttl: Duration) -> SyncResult<()> {
        let json = serde_json::to_string(record)?;
        self.set_ex(keys::calendar_key(&record.calendar_id), json, ttl)
            .await
    }

    async fn list_keys(&self, prefix: &str) -> SyncResult<Vec<String>> {
        let pattern = format!("{}*", prefix);
        self.request(|tx| RedisCommand::Keys(pattern, tx)).await
    }

    async fn get_global_marker(&self) -> SyncResult<Option<DateTime<Utc>>> {
        match self.get(keys::LAST_FULL_SYNC.to_string()).await? {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    async fn set_global_marker(&self, at: DateTime<Utc>, ttl: Duration) -> SyncResult<()> {
        let json = serde_json::to_string(&at)?;
        self.set_ex(keys::LAST_FULL_SYNC.to_string(), json, ttl)
            .await
    }
}

impl RedisActor {
    /// Create a new actor and return its handle
    pub fn new(redis_url: &str) -> SyncResult<(Self, RedisActorHandle)> {
        let (command_tx, command_rx) = mpsc::channel(32);

        let client = RedisClient::open(redis_url)
            .map_err(|e| cache_error(&format!("Failed to create Redis client: {}", e)))?;

        let actor = Self {
            client,
            connection: None,
            command_rx,
        };

        let handle = RedisActorHandle { command_tx };

        Ok((actor, handle))
    }

    /// Start the actor's processing loop
    pub async fn run(&mut self) {
        info!("Redis actor started");

        while let Some(cmd) = self.command_rx.recv().await {
            match cmd {
                RedisCommand::Get(key, response_tx) => {
                    let result = self.get_value(&key).await;
                    let _ = response_tx.send(result);
                }
                RedisCommand::SetEx(key, value, ttl, response_tx) => {
                    let result = self.set_value(&key, value, ttl).await;
                    let _ = response_tx.send(result);
                }
                RedisCommand::Keys(pattern, response_tx) => {
                    let result = self.keys(&pattern).await;
                    let _ = response_tx.send(result);
                }
                RedisCommand::Shutdown => {
                    info!("Redis actor shutting down");
                    break;
                }
            }
        }

        self.connection = None;
        info!("Redis actor shut down");
    }

    /// Get the shared connection, connecting on first use
    async fn connection(&mut self) -> SyncResult<&mut ConnectionManager> {
        if self.connection.is_none() {
            let manager = ConnectionManager::new(self.client.clone())
                .await
                .map_err(|e| cache_error(&format!("Failed to connect to Redis: {}", e)))?;
            info!("Connected to Redis");
            self.connection = Some(manager);
        }

        self.connection
            .as_mut()
            .ok_or_else(|| cache_error("Redis connection missing"))
    }

    async fn get_value(&mut self, key: &str) -> SyncResult<Option<String>> {
        let conn = self.connection().await?;
        let value: Option<String> = conn.get(key).await.map_err(|e| {
            warn!("Redis GET {} failed: {}", key, e);
            cache_error(&format!("Redis GET error: {}", e))
        })?;
        Ok(value)
    }

    async fn set_value(&mut self, key: &str, value: String, ttl: Duration) -> SyncResult<()> {
        let conn = self.connection().await?;
        // SET with EX refreshes the expiry on every write
        let seconds = ttl.as_secs().max(1);
        conn.set_ex::<_, _, ()>(key, value, seconds)
            .await
            .map_err(|e| cache_error(&format!("Redis SET error: {}", e)))?;
        debug!("Stored {} for {}s", key, seconds);
        Ok(())
    }

    async fn keys(&mut self, pattern: &str) -> SyncResult<Vec<String>> {
        let conn = self.connection().await?;
        let keys: Vec<String> = conn
            .keys(pattern)
            .await
            .map_err(|e| cache_error(&format!("Redis KEYS error: {}", e)))?;
        Ok(keys)
    }
}
