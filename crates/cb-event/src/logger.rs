use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::event::{Event, Level};

/// Severity-specific output of the event logger
pub trait EventSink: Send + Sync {
    fn info(&self, line: &str);

    fn warn(&self, line: &str);

    fn error(&self, line: &str);
}

/// Writes event lines through `tracing` under the `cellbase::event` target
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn info(&self, line: &str) {
        info!(target: "cellbase::event", "{}", line);
    }

    fn warn(&self, line: &str) {
        warn!(target: "cellbase::event", "{}", line);
    }

    fn error(&self, line: &str) {
        error!(target: "cellbase::event", "{}", line);
    }
}

/// Leveled logger owned by one cell.
///
/// Events below the threshold are dropped; the rest go to the sink matching
/// their level, prefixed with the cell identity. Output is synchronous.
pub struct EventLogger {
    cell_id: String,
    threshold: AtomicU8,
    sink: Arc<dyn EventSink>,
}

impl EventLogger {
    pub fn new(cell_id: impl Into<String>, threshold: Level) -> Self {
        Self::with_sink(cell_id, threshold, Arc::new(TracingSink))
    }

    pub fn with_sink(
        cell_id: impl Into<String>,
        threshold: Level,
        sink: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            cell_id: cell_id.into(),
            threshold: AtomicU8::new(threshold.as_u8()),
            sink,
        }
    }

    pub fn cell_id(&self) -> &str {
        &self.cell_id
    }

    pub fn log_level(&self) -> Level {
        Level::from_u8(self.threshold.load(Ordering::Relaxed)).unwrap_or(Level::Info)
    }

    pub fn set_log_level(&self, level: Level) {
        self.threshold.store(level.as_u8(), Ordering::Relaxed);
    }

    /// Returns whether the event passed the threshold
    pub fn log(&self, event: &Event) -> bool {
        if event.level < self.log_level() {
            return false;
        }
        let line = format!(
            "[{}] {},{},{},{}",
            self.cell_id, event.level, event.action, event.object, event.result
        );
        match event.level {
            Level::Info => self.sink.info(&line),
            Level::Warn => self.sink.warn(&line),
            Level::Error => self.sink.error(&line),
        }
        true
    }
}
