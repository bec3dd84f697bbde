//! Redis backend for the pending-share store.

use std::time::Duration;

use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::AsyncCommands;
use tokio::sync::OnceCell;
use tracing::{debug, warn};

use crate::share::models::{PendingShareRecord, ShareId};
use crate::share::store::{expiry_cutoff, PendingShareStore, StoreError};

/// Redis-backed [`PendingShareStore`].
///
/// Each record is a JSON string under `<prefix>:<id>`. Keys also carry a Redis TTL
/// equal to the expiry window, so records vanish even if no sweep ever runs.
pub struct RedisShareStore {
    client: redis::Client,
    conn: OnceCell<MultiplexedConnection>,
    prefix: String,
    ttl: Duration,
}

impl RedisShareStore {
    pub fn new(redis_url: &str, prefix: &str, ttl: Duration) -> Result<Self, StoreError> {
        let client =
            redis::Client::open(redis_url).map_err(|e| StoreError::Unavailable(e.to_string()))?;
        Ok(Self {
            client,
            conn: OnceCell::new(),
            prefix: prefix.trim_end_matches(':').to_string(),
            ttl,
        })
    }

    fn key(&self, id: &ShareId) -> String {
        format!("{}:{}", self.prefix, id)
    }

    /// Lazily opens the shared connection. Failures are not cached, so the next
    /// call retries.
    async fn conn(&self) -> Result<MultiplexedConnection, StoreError> {
        self.conn
            .get_or_try_init(|| async {
                self.client
                    .get_multiplexed_async_connection()
                    .await
                    .map_err(|e| StoreError::Unavailable(e.to_string()))
            })
            .await
            .cloned()
    }

    fn ttl_for(&self, record: &PendingShareRecord) -> u64 {
        let age = (chrono::Utc::now() - record.timestamp)
            .to_std()
            .unwrap_or_default();
        self.ttl.saturating_sub(age).as_secs().max(1)
    }
}

fn backend(e: redis::RedisError) -> StoreError {
    if e.is_connection_refusal() || e.is_connection_dropped() || e.is_io_error() {
        StoreError::Unavailable(e.to_string())
    } else {
        StoreError::Backend(e.to_string())
    }
}

#[async_trait]
impl PendingShareStore for RedisShareStore {
    async fn put(&self, record: PendingShareRecord) -> Result<(), StoreError> {
        let key = self.key(&record.id);
        let ttl = self.ttl_for(&record);
        let value = serde_json::to_string(&record)?;

        let mut conn = self.conn().await?;
        redis::cmd("SET")
            .arg(&key)
            .arg(value)
            .arg("EX")
            .arg(ttl)
            .query_async::<_, ()>(&mut conn)
            .await
            .map_err(backend)?;

        debug!(key, ttl, "Stored pending share");
        Ok(())
    }

    async fn get(&self, id: &ShareId) -> Result<Option<PendingShareRecord>, StoreError> {
        let mut conn = self.conn().await?;
        let value: Option<String> = conn.get(self.key(id)).await.map_err(backend)?;
        value
            .map(|json| serde_json::from_str(&json))
            .transpose()
            .map_err(StoreError::from)
    }

    async fn delete(&self, id: &ShareId) -> Result<(), StoreError> {
        let mut conn = self.conn().await?;
        conn.del::<_, ()>(self.key(id)).await.map_err(backend)
    }

    async fn take(&self, id: &ShareId) -> Result<Option<PendingShareRecord>, StoreError> {
        let mut conn = self.conn().await?;
        let value: Option<String> = redis::cmd("GETDEL")
            .arg(self.key(id))
            .query_async(&mut conn)
            .await
            .map_err(backend)?;
        value
            .map(|json| serde_json::from_str(&json))
            .transpose()
            .map_err(StoreError::from)
    }

    async fn sweep_expired(&self, max_age: Duration) -> Result<usize, StoreError> {
        let cutoff = expiry_cutoff(max_age);
        let mut conn = self.conn().await?;

        let keys: Vec<String> = {
            let mut iter = conn
                .scan_match::<_, String>(format!("{}:*", self.prefix))
                .await
                .map_err(backend)?;
            let mut keys = Vec::new();
            while let Some(key) = iter.next_item().await {
                keys.push(key);
            }
            keys
        };

        let mut removed = 0;
        for key in keys {
            let value: Option<String> = conn.get(&key).await.map_err(backend)?;
            let Some(json) = value else { continue };

            let expired = match serde_json::from_str::<PendingShareRecord>(&json) {
                Ok(record) => record.timestamp < cutoff,
                Err(e) => {
                    warn!(key, error = %e, "Unreadable pending share; removing");
                    true
                }
            };

            if expired {
                conn.del::<_, ()>(&key).await.map_err(backend)?;
                removed += 1;
            }
        }

        Ok(removed)
    }
}
