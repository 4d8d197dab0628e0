use anyhow::Result;
use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::AsyncCommands;
use tracing::info;

use crate::store::{KeyValueStore, StoreError};

/// Namespace applied to every key so the store can share a Redis database.
const KEY_PREFIX: &str = "rehearse:";

/// Redis-backed store over a single multiplexed connection.
#[derive(Clone)]
pub struct RedisStore {
    conn: MultiplexedConnection,
}

impl RedisStore {
    /// Opens the client and establishes the shared connection.
    pub async fn connect(redis_url: &str) -> Result<Self> {
        info!("Connecting to Redis...");

        let client = redis::Client::open(redis_url)?;
        let conn = client.get_multiplexed_async_connection().await?;

        info!("Redis connection established");
        Ok(Self { conn })
    }

    fn key(key: &str) -> String {
        format!("{KEY_PREFIX}{key}")
    }
}

#[async_trait]
impl KeyValueStore for RedisStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let mut conn = self.conn.clone();
        Ok(conn.get::<_, Option<String>>(Self::key(key)).await?)
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        conn.set::<_, _, ()>(Self::key(key), value).await?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        conn.del::<_, ()>(Self::key(key)).await?;
        Ok(())
    }
}
