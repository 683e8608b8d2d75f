use chrono::Utc;
use serde::{Deserialize, Serialize};

// ============================================================================
// Structured Error Payload
// ============================================================================

/// Language used for error messages when the caller does not ask for another one
pub const DEFAULT_LANG: &str = "en";

/// Error body handed to the HTTP layer: `{code, message: {lang, value}}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorPayload {
    pub code: String,
    pub message: ErrorMessage,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorMessage {
    pub lang: String,
    pub value: String,
}

impl ErrorPayload {
    pub fn new(code: impl Into<String>, value: impl Into<String>) -> Self {
        Self::with_lang(code, DEFAULT_LANG, value)
    }

    pub fn with_lang(
        code: impl Into<String>,
        lang: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        Self {
            code: code.into(),
            message: ErrorMessage {
                lang: lang.into(),
                value: value.into(),
            },
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "code": self.code,
            "message": {
                "lang": self.message.lang,
                "value": self.message.value,
            }
        })
    }
}

/// An error that carries a stable, client-visible code.
///
/// Codes follow the `PR<status>-<area>-<nnnn>` convention, e.g. `PR400-EV-0004`.
pub trait CodedError: std::error::Error {
    fn code(&self) -> &'static str;

    fn payload(&self) -> ErrorPayload {
        ErrorPayload::new(self.code(), self.to_string())
    }
}

// ============================================================================
// Time
// ============================================================================

/// Current wall-clock time in epoch milliseconds
pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}
