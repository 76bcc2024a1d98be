//! Store client — KV, sets, lists, pub/sub, and SCAN over one Redis instance.
//!
//! The store exclusively owns all persistent state; every other component
//! holds only derived, in-memory views.

use std::time::Duration;

use deadpool_redis::{Pool, Runtime};
use redis::AsyncCommands;
use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Store connection failed: {0}")]
    ConnectionFailed(String),
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),
    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

pub struct RedisStore {
    pool: Pool,
    /// Dedicated client for pub/sub; subscriptions need their own connection
    /// outside the pool.
    client: redis::Client,
}

impl RedisStore {
    pub fn connect(url: &str) -> Result<Self, StoreError> {
        let pool = deadpool_redis::Config::from_url(url)
            .create_pool(Some(Runtime::Tokio1))
            .map_err(|e| StoreError::ConnectionFailed(e.to_string()))?;
        let client = redis::Client::open(url)
            .map_err(|e| StoreError::ConnectionFailed(e.to_string()))?;
        Ok(Self { pool, client })
    }

    async fn conn(&self) -> Result<deadpool_redis::Connection, StoreError> {
        self.pool
            .get()
            .await
            .map_err(|e| StoreError::ConnectionFailed(e.to_string()))
    }

    pub async fn ping(&self) -> Result<(), StoreError> {
        let mut conn = self.conn().await?;
        let _: String = redis::cmd("PING").query_async(&mut conn).await?;
        Ok(())
    }

    // ── Key / value ───────────────────────────────────────────────

    pub async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let mut conn = self.conn().await?;
        Ok(conn.get(key).await?)
    }

    pub async fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let mut conn = self.conn().await?;
        let _: () = conn.set(key, value).await?;
        Ok(())
    }

    pub async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> Result<(), StoreError> {
        let mut conn = self.conn().await?;
        let _: () = conn.set_ex(key, value, ttl.as_secs()).await?;
        Ok(())
    }

    pub async fn del(&self, key: &str) -> Result<(), StoreError> {
        let mut conn = self.conn().await?;
        let _: () = conn.del(key).await?;
        Ok(())
    }

    /// JSON read-through for typed records.
    pub async fn get_json<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, StoreError> {
        match self.get(key).await? {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    pub async fn set_json<T: Serialize>(&self, key: &str, value: &T) -> Result<(), StoreError> {
        self.set(key, &serde_json::to_string(value)?).await
    }

    pub async fn set_json_ex<T: Serialize>(
        &self,
        key: &str,
        value: &T,
        ttl: Duration,
    ) -> Result<(), StoreError> {
        self.set_ex(key, &serde_json::to_string(value)?, ttl).await
    }

    // ── Sets ──────────────────────────────────────────────────────

    pub async fn sadd(&self, set: &str, member: &str) -> Result<(), StoreError> {
        let mut conn = self.conn().await?;
        let _: () = conn.sadd(set, member).await?;
        Ok(())
    }

    pub async fn srem(&self, set: &str, member: &str) -> Result<(), StoreError> {
        let mut conn = self.conn().await?;
        let _: () = conn.srem(set, member).await?;
        Ok(())
    }

    pub async fn smembers(&self, set: &str) -> Result<Vec<String>, StoreError> {
        let mut conn = self.conn().await?;
        Ok(conn.smembers(set).await?)
    }

    // ── Lists ─────────────────────────────────────────────────────

    pub async fn rpush(&self, list: &str, value: &str) -> Result<(), StoreError> {
        let mut conn = self.conn().await?;
        let _: () = conn.rpush(list, value).await?;
        Ok(())
    }

    /// Remove up to `count` occurrences of `value` (0 = all occurrences).
    pub async fn lrem(&self, list: &str, count: isize, value: &str) -> Result<(), StoreError> {
        let mut conn = self.conn().await?;
        let _: () = conn.lrem(list, count, value).await?;
        Ok(())
    }

    pub async fn lrange(&self, list: &str) -> Result<Vec<String>, StoreError> {
        let mut conn = self.conn().await?;
        Ok(conn.lrange(list, 0, -1).await?)
    }

    // ── Sorted sets ───────────────────────────────────────────────

    pub async fn zadd(&self, key: &str, member: &str, score: f64) -> Result<(), StoreError> {
        let mut conn = self.conn().await?;
        let _: () = conn.zadd(key, member, score).await?;
        Ok(())
    }

    pub async fn zrange_by_score(
        &self,
        key: &str,
        min: f64,
        max: f64,
    ) -> Result<Vec<String>, StoreError> {
        let mut conn = self.conn().await?;
        Ok(conn.zrangebyscore(key, min, max).await?)
    }

    pub async fn zrem_range_by_score(
        &self,
        key: &str,
        min: f64,
        max: f64,
    ) -> Result<(), StoreError> {
        let mut conn = self.conn().await?;
        let _: () = conn.zrembyscore(key, min, max).await?;
        Ok(())
    }

    // ── Pub/sub and SCAN ──────────────────────────────────────────

    pub async fn publish(&self, channel: &str, payload: &str) -> Result<(), StoreError> {
        let mut conn = self.conn().await?;
        let _: () = conn.publish(channel, payload).await?;
        Ok(())
    }

    /// Pattern-subscribe on a dedicated connection.
    pub async fn psubscribe(&self, pattern: &str) -> Result<redis::aio::PubSub, StoreError> {
        let mut pubsub = self.client.get_async_pubsub().await?;
        pubsub.psubscribe(pattern).await?;
        Ok(pubsub)
    }

    /// All keys matching `pattern`, collected via cursor SCAN (never KEYS).
    pub async fn scan(&self, pattern: &str) -> Result<Vec<String>, StoreError> {
        let mut conn = self.conn().await?;
        let mut keys = Vec::new();
        let mut iter = conn.scan_match::<_, String>(pattern).await?;
        while let Some(item) = iter.next_item().await {
            keys.push(item?);
        }
        Ok(keys)
    }
}
