use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use std::future::Future;
use std::time::Duration;
use tracing::info;

use crate::client::CacheClient;
use crate::{CacheError, Result};

/// Redis-backed cache client.
///
/// `ConnectionManager` multiplexes one connection and reconnects on failure;
/// each call works on a cheap clone of it. Every round-trip is bounded by
/// `op_timeout` so an unreachable server degrades to an error, never a hang.
#[derive(Clone)]
pub struct RedisCacheClient {
    conn: ConnectionManager,
    op_timeout: Duration,
}

impl RedisCacheClient {
    pub async fn connect(url: &str, op_timeout: Duration) -> Result<Self> {
        let client = redis::Client::open(url)?;
        let conn = tokio::time::timeout(op_timeout, ConnectionManager::new(client))
            .await
            .map_err(|_| CacheError::Timeout { op: "connect" })??;
        info!(url = %url, "Connected to Redis cache");
        Ok(Self { conn, op_timeout })
    }

    async fn bounded<T, F>(&self, op: &'static str, fut: F) -> Result<T>
    where
        F: Future<Output = redis::RedisResult<T>>,
    {
        match tokio::time::timeout(self.op_timeout, fut).await {
            Ok(result) => Ok(result?),
            Err(_) => Err(CacheError::Timeout { op }),
        }
    }
}

#[async_trait]
impl CacheClient for RedisCacheClient {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut conn = self.conn.clone();
        self.bounded("get", async move { conn.get::<_, Option<String>>(key).await })
            .await
    }

    async fn put(&self, key: &str, expires_in: Option<u64>, value: &str) -> Result<()> {
        let mut conn = self.conn.clone();
        match expires_in.filter(|secs| *secs > 0) {
            Some(secs) => {
                self.bounded("put", async move { conn.set_ex::<_, _, ()>(key, value, secs).await })
                    .await
            }
            None => {
                self.bounded("put", async move { conn.set::<_, _, ()>(key, value).await })
                    .await
            }
        }
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let mut conn = self.conn.clone();
        self.bounded("delete", async move { conn.del::<_, ()>(key).await })
            .await
    }
}
