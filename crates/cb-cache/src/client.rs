use async_trait::async_trait;
use dashmap::DashMap;
use std::time::{Duration, Instant};

use crate::Result;

/// Key/value access to the shared cache service.
///
/// `expires_in` is in seconds; `None` keeps the entry until it is replaced
/// or deleted.
#[async_trait]
pub trait CacheClient: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>>;

    async fn put(&self, key: &str, expires_in: Option<u64>, value: &str) -> Result<()>;

    async fn delete(&self, key: &str) -> Result<()>;
}

struct Entry {
    value: String,
    expires_at: Option<Instant>,
}

/// Process-local cache for single-node deployments and tests
#[derive(Default)]
pub struct InMemoryCacheClient {
    entries: DashMap<String, Entry>,
}

impl InMemoryCacheClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl CacheClient for InMemoryCacheClient {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let now = Instant::now();
        let expired = match self.entries.get(key) {
            None => return Ok(None),
            Some(entry) => match entry.expires_at {
                Some(at) if at <= now => true,
                _ => return Ok(Some(entry.value.clone())),
            },
        };
        if expired {
            self.entries.remove_if(key, |_, e| e.expires_at.map(|at| at <= now).unwrap_or(false));
        }
        Ok(None)
    }

    async fn put(&self, key: &str, expires_in: Option<u64>, value: &str) -> Result<()> {
        let expires_at = expires_in
            .filter(|secs| *secs > 0)
            .and_then(|secs| Instant::now().checked_add(Duration::from_secs(secs)));
        self.entries.insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at,
            },
        );
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.entries.remove(key);
        Ok(())
    }
}

/// Cache that stores nothing; every read is a miss
pub struct NoopCacheClient;

#[async_trait]
impl CacheClient for NoopCacheClient {
    async fn get(&self, _key: &str) -> Result<Option<String>> {
        Ok(None)
    }

    async fn put(&self, _key: &str, _expires_in: Option<u64>, _value: &str) -> Result<()> {
        Ok(())
    }

    async fn delete(&self, _key: &str) -> Result<()> {
        Ok(())
    }
}
