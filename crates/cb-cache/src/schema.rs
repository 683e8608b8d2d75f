//! Schema Cache
//!
//! Caches the schema metadata of each user-data collection under
//! `userodata:<node id>`. Invalidation overwrites the entry with a
//! `{"disabledTime": <epoch ms>}` marker instead of deleting it, so a reader
//! holding an older snapshot can tell "never cached" apart from "cached and
//! since invalidated".
//!
//! Cache-service failures never reach the caller: reads degrade to a miss,
//! writes are logged and dropped. A miss always means "read the
//! authoritative store".

use cb_common::now_millis;
use cb_config::CacheConfig;
use metrics::counter;
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::{debug, info};

use crate::client::CacheClient;

pub const KEY_PREFIX: &str = "userodata:";
pub const DISABLED_TIME_KEY: &str = "disabledTime";

pub type Schema = Map<String, Value>;

pub struct SchemaCache {
    client: Arc<dyn CacheClient>,
    enabled: bool,
    expires_in: Option<u64>,
}

impl SchemaCache {
    pub fn new(client: Arc<dyn CacheClient>, config: &CacheConfig) -> Self {
        Self {
            client,
            enabled: config.schema_enabled,
            expires_in: Some(config.expires_in_secs).filter(|secs| *secs > 0),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn key(node_id: &str) -> String {
        format!("{}{}", KEY_PREFIX, node_id)
    }

    /// Cached schema (or disable marker) for the collection
    pub async fn get(&self, node_id: &str) -> Option<Schema> {
        if !self.enabled {
            return None;
        }
        let raw = match self.client.get(&Self::key(node_id)).await {
            Ok(Some(raw)) => raw,
            Ok(None) => {
                counter!("cellbase_schema_cache_misses_total").increment(1);
                return None;
            }
            Err(e) => {
                info!(node_id = %node_id, error = %e, "Schema cache read failed, treating as miss");
                counter!("cellbase_schema_cache_errors_total").increment(1);
                return None;
            }
        };
        match serde_json::from_str::<Schema>(&raw) {
            Ok(schema) => {
                counter!("cellbase_schema_cache_hits_total").increment(1);
                Some(schema)
            }
            Err(e) => {
                debug!(
                    node_id = %node_id,
                    error = %e,
                    "Undecodable schema cache entry, treating as miss"
                );
                counter!("cellbase_schema_cache_errors_total").increment(1);
                None
            }
        }
    }

    pub async fn cache(&self, node_id: &str, schema: &Schema) {
        if !self.enabled {
            return;
        }
        let raw = Value::Object(schema.clone()).to_string();
        self.write(node_id, &raw).await;
    }

    pub async fn clear(&self, node_id: &str) {
        if !self.enabled {
            return;
        }
        if let Err(e) = self.client.delete(&Self::key(node_id)).await {
            info!(node_id = %node_id, error = %e, "Schema cache clear failed");
        }
    }

    /// Replace the entry with a disable marker stamped with the current time
    pub async fn disable(&self, node_id: &str) {
        if !self.enabled {
            return;
        }
        let mut marker = Schema::new();
        marker.insert(DISABLED_TIME_KEY.to_string(), Value::from(now_millis()));
        self.write(node_id, &Value::Object(marker).to_string()).await;
        debug!(node_id = %node_id, "Schema cache entry disabled");
    }

    /// A missing value, a disable marker, or caching being off all mean
    /// the schema must not be trusted.
    pub fn is_disabled(&self, value: Option<&Schema>) -> bool {
        if !self.enabled {
            return true;
        }
        match value {
            None => true,
            Some(schema) => schema.contains_key(DISABLED_TIME_KEY),
        }
    }

    /// Whether the cached entry moved on since `previous` was observed.
    ///
    /// Always false when caching is off. Otherwise no current entry counts
    /// as changed, and the disable timestamps of both (0 when absent) are
    /// compared.
    pub async fn is_changed(&self, node_id: &str, previous: &Schema) -> bool {
        if !self.enabled {
            return false;
        }
        match self.get(node_id).await {
            None => true,
            Some(current) => disabled_time(previous) != disabled_time(&current),
        }
    }

    async fn write(&self, node_id: &str, raw: &str) {
        if let Err(e) = self.client.put(&Self::key(node_id), self.expires_in, raw).await {
            info!(node_id = %node_id, error = %e, "Schema cache write failed");
        }
    }
}

/// Disable timestamp of a schema entry, 0 when it carries none
pub fn disabled_time(schema: &Schema) -> i64 {
    schema.get(DISABLED_TIME_KEY).and_then(Value::as_i64).unwrap_or(0)
}
