use thiserror::Error;

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Cache operation timed out: {op}")]
    Timeout { op: &'static str },

    #[error("Cached value could not be decoded: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("Cache service unavailable: {0}")]
    Unavailable(String),
}
