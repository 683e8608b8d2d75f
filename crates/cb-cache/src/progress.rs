//! Progress Store
//!
//! Status records for long-running asynchronous operations, keyed by
//! operation id. The store is a plain pass-through: the last `put` wins and
//! an absent record means "no known operation", including after a transport
//! failure.

use cb_common::{now_millis, ErrorPayload};
use cb_config::ProgressConfig;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, info};

use crate::client::CacheClient;

/// One stored status record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Progress {
    pub key: String,
    pub value: String,
}

impl Progress {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

pub struct ProgressStore {
    client: Arc<dyn CacheClient>,
    expires_in: Option<u64>,
}

impl ProgressStore {
    pub fn new(client: Arc<dyn CacheClient>, config: &ProgressConfig) -> Self {
        Self {
            client,
            expires_in: Some(config.expires_in_secs).filter(|secs| *secs > 0),
        }
    }

    pub async fn put_progress(&self, progress: &Progress) {
        if let Err(e) = self
            .client
            .put(&progress.key, self.expires_in, &progress.value)
            .await
        {
            info!(key = %progress.key, error = %e, "Failed to store progress record");
        }
    }

    pub async fn get_progress(&self, key: &str) -> Option<Progress> {
        match self.client.get(key).await {
            Ok(value) => value.map(|value| Progress::new(key, value)),
            Err(e) => {
                debug!(key = %key, error = %e, "Progress read failed, treating as unknown");
                None
            }
        }
    }

    pub async fn delete_progress(&self, key: &str) {
        if let Err(e) = self.client.delete(key).await {
            info!(key = %key, error = %e, "Failed to delete progress record");
        }
    }
}

// ============================================================================
// Structured status payload
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProgressStatus {
    Ready,
    Processing,
    Completed,
    Failed,
}

impl ProgressStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProgressStatus::Ready => "ready",
            ProgressStatus::Processing => "processing",
            ProgressStatus::Completed => "completed",
            ProgressStatus::Failed => "failed",
        }
    }
}

/// Producer-side status of an async operation, encoded into the opaque
/// record value as
/// `{"process": p, "<p>Info": {cell_id, box_id, started_at, ended_at, status, progress, message}}`.
#[derive(Debug, Clone)]
pub struct ProgressInfo {
    process: String,
    cell_id: String,
    box_id: Option<String>,
    started_at: i64,
    ended_at: Option<i64>,
    status: ProgressStatus,
    percent: u8,
    message: Option<ErrorPayload>,
}

impl ProgressInfo {
    pub fn new(
        process: impl Into<String>,
        cell_id: impl Into<String>,
        box_id: Option<&str>,
    ) -> Self {
        Self {
            process: process.into(),
            cell_id: cell_id.into(),
            box_id: box_id.map(str::to_string),
            started_at: now_millis(),
            ended_at: None,
            status: ProgressStatus::Ready,
            percent: 0,
            message: None,
        }
    }

    pub fn status(&self) -> ProgressStatus {
        self.status
    }

    pub fn percent(&self) -> u8 {
        self.percent
    }

    pub fn set_processing(&mut self, percent: u8) {
        self.status = ProgressStatus::Processing;
        self.percent = percent.min(100);
    }

    pub fn complete(&mut self) {
        self.status = ProgressStatus::Completed;
        self.percent = 100;
        self.ended_at = Some(now_millis());
    }

    /// Record the last error; progress stays where it stopped
    pub fn fail(&mut self, error: ErrorPayload) {
        self.status = ProgressStatus::Failed;
        self.ended_at = Some(now_millis());
        self.message = Some(error);
    }

    pub fn to_value(&self) -> Value {
        let info = json!({
            "cell_id": self.cell_id,
            "box_id": self.box_id,
            "started_at": self.started_at,
            "ended_at": self.ended_at,
            "status": self.status.as_str(),
            "progress": format!("{}%", self.percent),
            "message": self.message.as_ref().map(ErrorPayload::to_json),
        });
        let mut body = serde_json::Map::new();
        body.insert("process".to_string(), Value::String(self.process.clone()));
        body.insert(format!("{}Info", self.process), info);
        Value::Object(body)
    }

    pub fn to_progress(&self, key: impl Into<String>) -> Progress {
        Progress::new(key, self.to_value().to_string())
    }
}
