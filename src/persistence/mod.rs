use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client};
use tokio::time::{timeout, Duration};

use crate::error::StoreError;
use crate::models::InstrumentSnapshot;
use crate::store::InstrumentStore;

const DEFAULT_KEY: &str = "instruments:latest";

/// Redis cache for the exchange instrument rule set
///
/// The snapshot is stored as a single JSON value; each refresh replaces it.
pub struct RedisInstrumentCache {
    conn: ConnectionManager,
    key: String,
}

impl RedisInstrumentCache {
    /// Connect to Redis
    ///
    /// # Arguments
    /// * `redis_url` - Redis connection URL (e.g., "redis://127.0.0.1:6379")
    pub async fn new(redis_url: &str) -> Result<Self, StoreError> {
        Self::with_key(redis_url, DEFAULT_KEY).await
    }

    /// Connect to Redis, storing the snapshot under `key`
    pub async fn with_key(redis_url: &str, key: &str) -> Result<Self, StoreError> {
        let client = Client::open(redis_url)?;

        // Add 5 second timeout to connection attempt
        let conn = timeout(Duration::from_secs(5), ConnectionManager::new(client))
            .await
            .map_err(|_| StoreError::Unavailable("Redis connection timeout after 5 seconds".into()))??;

        tracing::info!("Connected to Redis at {}", redis_url);

        Ok(Self {
            conn,
            key: key.to_string(),
        })
    }

    /// Remove the stored snapshot
    pub async fn clear(&self) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        conn.del::<_, ()>(&self.key).await?;
        Ok(())
    }
}

#[async_trait]
impl InstrumentStore for RedisInstrumentCache {
    async fn save_instrument_snapshot(
        &self,
        snapshot: &InstrumentSnapshot,
    ) -> Result<(), StoreError> {
        let value = serde_json::to_string(snapshot)?;
        let mut conn = self.conn.clone();
        conn.set::<_, _, ()>(&self.key, value).await?;

        tracing::debug!(
            "Saved {} instruments to Redis (fetched {})",
            snapshot.instruments.len(),
            snapshot.fetched_at
        );

        Ok(())
    }

    async fn latest_instrument_snapshot(&self) -> Result<Option<InstrumentSnapshot>, StoreError> {
        let mut conn = self.conn.clone();
        let value: Option<String> = conn.get(&self.key).await?;

        value
            .map(|json| serde_json::from_str(&json).map_err(StoreError::from))
            .transpose()
    }
}
