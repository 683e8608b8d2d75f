use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

use crate::EventError;

/// Event severity, ordered `Info < Warn < Error`
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Level {
    Info,
    Warn,
    Error,
}

impl Level {
    pub fn as_str(&self) -> &'static str {
        match self {
            Level::Info => "INFO",
            Level::Warn => "WARN",
            Level::Error => "ERROR",
        }
    }

    pub fn as_u8(&self) -> u8 {
        match self {
            Level::Info => 0,
            Level::Warn => 1,
            Level::Error => 2,
        }
    }

    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Level::Info),
            1 => Some(Level::Warn),
            2 => Some(Level::Error),
            _ => None,
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Case-sensitive: only the three wire spellings are levels
impl FromStr for Level {
    type Err = EventError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "INFO" => Ok(Level::Info),
            "WARN" => Ok(Level::Warn),
            "ERROR" => Ok(Level::Error),
            other => Err(EventError::format("level", format!("unknown level {}", other))),
        }
    }
}

/// Validated event record; wire shape `{level, action, object, result}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    pub level: Level,
    pub action: String,
    pub object: String,
    pub result: String,
}

impl Event {
    pub fn new(
        level: Level,
        action: impl Into<String>,
        object: impl Into<String>,
        result: impl Into<String>,
    ) -> Self {
        Self {
            level,
            action: action.into(),
            object: object.into(),
            result: result.into(),
        }
    }
}

/// Event body as submitted, before validation.
///
/// Fields stay untyped so a wrong JSON type surfaces as a field format
/// error rather than a parse error.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawEvent {
    pub level: Option<Value>,
    pub action: Option<Value>,
    pub object: Option<Value>,
    pub result: Option<Value>,
}
