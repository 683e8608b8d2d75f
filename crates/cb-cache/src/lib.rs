//! CellBase Cache
//!
//! Shared cache-service access for the document layer:
//! - `CacheClient`: async key/value seam with Redis, in-memory and no-op backends
//! - `SchemaCache`: per-collection schema metadata with disable markers
//! - `ProgressStore`: async-operation status records
//!
//! Construct one client per process with [`connect`] and hand clones of the
//! `Arc` to every consumer.

pub mod client;
pub mod error;
pub mod progress;
pub mod redis_client;
pub mod schema;

pub use client::{CacheClient, InMemoryCacheClient, NoopCacheClient};
pub use error::CacheError;
pub use progress::{Progress, ProgressInfo, ProgressStatus, ProgressStore};
pub use redis_client::RedisCacheClient;
pub use schema::{disabled_time, Schema, SchemaCache, DISABLED_TIME_KEY};

use std::sync::Arc;
use std::time::Duration;

use cb_config::{CacheConfig, CacheKind};
use tracing::info;

pub type Result<T> = std::result::Result<T, CacheError>;

/// Build the process-wide cache client for the configured backend
pub async fn connect(config: &CacheConfig) -> Result<Arc<dyn CacheClient>> {
    let client: Arc<dyn CacheClient> = match config.kind {
        CacheKind::Redis => {
            let timeout = Duration::from_millis(config.op_timeout_ms);
            Arc::new(RedisCacheClient::connect(&config.redis_url, timeout).await?)
        }
        CacheKind::Memory => Arc::new(InMemoryCacheClient::new()),
        CacheKind::None => Arc::new(NoopCacheClient),
    };
    info!(kind = ?config.kind, "Cache client ready");
    Ok(client)
}
