//! CellBase Configuration
//!
//! Loads the unit configuration from a TOML file and layers `CB_*`
//! environment variables on top. Every section has defaults so an empty
//! file (or no file at all) yields a runnable configuration with the
//! event bus left unconfigured.
//!
//! ## Environment Variables
//!
//! | Variable | Section key |
//! |----------|-------------|
//! | `CB_CACHE_KIND` | `cache.kind` (`redis`, `memory`, `none`) |
//! | `CB_CACHE_REDIS_URL` | `cache.redis_url` |
//! | `CB_CACHE_SCHEMA_ENABLED` | `cache.schema_enabled` |
//! | `CB_PROGRESS_EXPIRES_IN_SECS` | `progress.expires_in_secs` |
//! | `CB_EVENT_LOG_LEVEL` | `event.log_level` |
//! | `CB_EVENTBUS_MQ` | `event_bus.mq` (`kafka`, `amqp`, `memory`) |
//! | `CB_EVENTBUS_BROKER` | `event_bus.broker` |
//! | `CB_EVENTBUS_USERNAME` | `event_bus.username` |
//! | `CB_EVENTBUS_PASSWORD` | `event_bus.password` |

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;
use tracing::{debug, info};

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Invalid value for {key}: {value}")]
    InvalidValue { key: String, value: String },
}

pub type Result<T> = std::result::Result<T, ConfigError>;

// ============================================================================
// Sections
// ============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub cache: CacheConfig,
    pub progress: ProgressConfig,
    pub event: EventConfig,
    pub event_bus: EventBusConfig,
}

/// Backend used for the shared cache-service client
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheKind {
    Redis,
    Memory,
    None,
}

impl std::str::FromStr for CacheKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "redis" => Ok(CacheKind::Redis),
            "memory" => Ok(CacheKind::Memory),
            "none" => Ok(CacheKind::None),
            other => Err(ConfigError::InvalidValue {
                key: "cache.kind".to_string(),
                value: other.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub kind: CacheKind,
    pub redis_url: String,
    /// Upper bound for a single cache round-trip
    pub op_timeout_ms: u64,
    /// Expiry applied to cached schema entries; 0 keeps them until replaced
    pub expires_in_secs: u64,
    pub schema_enabled: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            kind: CacheKind::Memory,
            redis_url: "redis://127.0.0.1:6379".to_string(),
            op_timeout_ms: 1000,
            expires_in_secs: 86400,
            schema_enabled: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProgressConfig {
    pub expires_in_secs: u64,
}

impl Default for ProgressConfig {
    fn default() -> Self {
        Self {
            expires_in_secs: 259200,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EventConfig {
    /// Maximum length of the action/object/result fields
    pub max_value_length: usize,
    /// Default threshold for the per-cell event logger
    pub log_level: String,
}

impl Default for EventConfig {
    fn default() -> Self {
        Self {
            max_value_length: 51200,
            log_level: "INFO".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EventBusConfig {
    /// Broker family: `kafka`, `amqp` or `memory`
    pub mq: Option<String>,
    /// Broker address(es), comma separated for Kafka
    pub broker: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    /// Topic every cell event is sent to
    pub topic_all: String,
    pub group_id: String,
    pub poll_timeout_ms: u64,
    pub auto_commit_interval_ms: u64,
    pub max_batch_size: usize,
}

impl Default for EventBusConfig {
    fn default() -> Self {
        Self {
            mq: None,
            broker: None,
            username: None,
            password: None,
            topic_all: "cellbase_events_topic".to_string(),
            group_id: "cellbase".to_string(),
            poll_timeout_ms: 1000,
            auto_commit_interval_ms: 1000,
            max_batch_size: 500,
        }
    }
}

impl EventBusConfig {
    /// Both a broker kind and an address are needed before any adapter is built
    pub fn is_configured(&self) -> bool {
        let present = |v: &Option<String>| {
            v.as_deref().map(|s| !s.trim().is_empty()).unwrap_or(false)
        };
        present(&self.mq) && present(&self.broker)
    }
}

// ============================================================================
// Loading
// ============================================================================

impl AppConfig {
    pub fn from_toml_str(s: &str) -> Result<Self> {
        Ok(toml::from_str(s)?)
    }

    /// Load from `path` if given, then apply environment overrides
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(p) => {
                let raw = std::fs::read_to_string(p).map_err(|source| ConfigError::Read {
                    path: p.display().to_string(),
                    source,
                })?;
                info!("Loaded configuration from {}", p.display());
                Self::from_toml_str(&raw)?
            }
            None => {
                debug!("No configuration file given, using defaults");
                Self::default()
            }
        };
        config.apply_env_overrides()?;
        Ok(config)
    }

    pub fn apply_env_overrides(&mut self) -> Result<()> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("CB_CACHE_KIND") {
            self.cache.kind = v.parse()?;
        }
        if let Some(v) = lookup("CB_CACHE_REDIS_URL") {
            self.cache.redis_url = v;
        }
        if let Some(v) = lookup("CB_CACHE_SCHEMA_ENABLED") {
            self.cache.schema_enabled = parse_value("CB_CACHE_SCHEMA_ENABLED", &v)?;
        }
        if let Some(v) = lookup("CB_PROGRESS_EXPIRES_IN_SECS") {
            self.progress.expires_in_secs = parse_value("CB_PROGRESS_EXPIRES_IN_SECS", &v)?;
        }
        if let Some(v) = lookup("CB_EVENT_LOG_LEVEL") {
            self.event.log_level = v;
        }
        if let Some(v) = lookup("CB_EVENTBUS_MQ") {
            self.event_bus.mq = Some(v);
        }
        if let Some(v) = lookup("CB_EVENTBUS_BROKER") {
            self.event_bus.broker = Some(v);
        }
        if let Some(v) = lookup("CB_EVENTBUS_USERNAME") {
            self.event_bus.username = Some(v);
        }
        if let Some(v) = lookup("CB_EVENTBUS_PASSWORD") {
            self.event_bus.password = Some(v);
        }
        Ok(())
    }
}

fn parse_value<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value.parse().map_err(|_| ConfigError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    #[test]
    fn test_defaults_leave_bus_unconfigured() {
        let config = AppConfig::default();
        assert!(!config.event_bus.is_configured());
        assert!(config.cache.schema_enabled);
        assert_eq!(config.event.max_value_length, 51200);
        assert_eq!(config.progress.expires_in_secs, 259200);
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = AppConfig::from_toml_str(
            r#"
            [cache]
            kind = "redis"
            schema_enabled = false

            [event_bus]
            mq = "kafka"
            broker = "kafka-1:9092,kafka-2:9092"
            "#,
        )
        .unwrap();

        assert_eq!(config.cache.kind, CacheKind::Redis);
        assert!(!config.cache.schema_enabled);
        assert_eq!(config.cache.op_timeout_ms, 1000);
        assert!(config.event_bus.is_configured());
        assert_eq!(config.event_bus.topic_all, "cellbase_events_topic");
    }

    #[test]
    fn test_kind_without_broker_is_unconfigured() {
        let mut bus = EventBusConfig::default();
        bus.mq = Some("amqp".to_string());
        assert!(!bus.is_configured());
        bus.broker = Some("  ".to_string());
        assert!(!bus.is_configured());
    }

    #[test]
    fn test_env_overrides() {
        let vars: HashMap<&str, &str> = [
            ("CB_CACHE_KIND", "none"),
            ("CB_EVENTBUS_MQ", "amqp"),
            ("CB_EVENTBUS_BROKER", "rabbit:5672"),
            ("CB_PROGRESS_EXPIRES_IN_SECS", "60"),
        ]
        .into_iter()
        .collect();

        let mut config = AppConfig::default();
        config
            .apply_overrides(|k| vars.get(k).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(config.cache.kind, CacheKind::None);
        assert_eq!(config.event_bus.mq.as_deref(), Some("amqp"));
        assert_eq!(config.progress.expires_in_secs, 60);
    }

    #[test]
    fn test_invalid_env_value() {
        let mut config = AppConfig::default();
        let err = config
            .apply_overrides(|k| (k == "CB_CACHE_SCHEMA_ENABLED").then(|| "maybe".to_string()))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[event]\nlog_level = \"WARN\"\nmax_value_length = 16").unwrap();

        let config = AppConfig::load(Some(file.path())).unwrap();
        assert_eq!(config.event.log_level, "WARN");
        assert_eq!(config.event.max_value_length, 16);
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let err = AppConfig::load(Some(Path::new("/nonexistent/cellbase.toml"))).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }
}
