//! Event and request-key validation.
//!
//! Every failure is a coded error for the HTTP layer:
//!
//! | Code | Meaning |
//! |------|---------|
//! | `PR400-EV-0001` | body is not valid JSON |
//! | `PR400-EV-0002` | request key is malformed |
//! | `PR400-EV-0003` | required field missing |
//! | `PR400-EV-0004` | field has the wrong format or length |

use cb_common::{now_millis, CodedError};
use serde_json::Value;
use thiserror::Error;

use crate::event::{Event, Level, RawEvent};
use crate::Result;

/// Maximum length of action/object/result unless configured otherwise
pub const DEFAULT_MAX_VALUE_LENGTH: usize = 51200;
pub const MAX_REQUEST_KEY_LENGTH: usize = 128;
const REQUEST_KEY_PREFIX: &str = "PCS-";

#[derive(Error, Debug)]
pub enum EventError {
    #[error("Event body is not valid JSON: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Request key is invalid: {key}")]
    RequestKeyInvalid { key: String },

    #[error("Required field is missing: {field}")]
    FieldMissing { field: &'static str },

    #[error("Field {field} has an invalid format: {reason}")]
    FieldFormat { field: &'static str, reason: String },
}

impl EventError {
    pub fn missing(field: &'static str) -> Self {
        Self::FieldMissing { field }
    }

    pub fn format(field: &'static str, reason: impl Into<String>) -> Self {
        Self::FieldFormat {
            field,
            reason: reason.into(),
        }
    }
}

impl CodedError for EventError {
    fn code(&self) -> &'static str {
        match self {
            EventError::Parse(_) => "PR400-EV-0001",
            EventError::RequestKeyInvalid { .. } => "PR400-EV-0002",
            EventError::FieldMissing { .. } => "PR400-EV-0003",
            EventError::FieldFormat { .. } => "PR400-EV-0004",
        }
    }
}

pub fn validate_level(level: Option<&str>) -> Result<Level> {
    level.ok_or_else(|| EventError::missing("level"))?.parse()
}

pub fn validate_action(action: Option<&str>, max_length: usize) -> Result<()> {
    validate_bounded("action", action, max_length)
}

pub fn validate_object(object: Option<&str>, max_length: usize) -> Result<()> {
    validate_bounded("object", object, max_length)
}

pub fn validate_result(result: Option<&str>, max_length: usize) -> Result<()> {
    validate_bounded("result", result, max_length)
}

fn validate_bounded(field: &'static str, value: Option<&str>, max_length: usize) -> Result<()> {
    let value = value.ok_or_else(|| EventError::missing(field))?;
    let length = value.chars().count();
    if length > max_length {
        return Err(EventError::format(
            field,
            format!("length {} exceeds {}", length, max_length),
        ));
    }
    Ok(())
}

/// Parse and validate an event body
pub fn parse_event(body: &str, max_length: usize) -> Result<Event> {
    let raw: RawEvent = serde_json::from_str(body)?;

    let level = string_field("level", raw.level.as_ref())?;
    let action = string_field("action", raw.action.as_ref())?;
    let object = string_field("object", raw.object.as_ref())?;
    let result = string_field("result", raw.result.as_ref())?;

    let level = validate_level(level)?;
    validate_action(action, max_length)?;
    validate_object(object, max_length)?;
    validate_result(result, max_length)?;

    Ok(Event::new(
        level,
        action.unwrap_or_default(),
        object.unwrap_or_default(),
        result.unwrap_or_default(),
    ))
}

/// Re-check an already decoded event, e.g. one arriving from the bus
pub fn validate_event(event: &Event, max_length: usize) -> Result<()> {
    validate_action(Some(&event.action), max_length)?;
    validate_object(Some(&event.object), max_length)?;
    validate_result(Some(&event.result), max_length)
}

/// `null` and absent are both "missing"; any non-string is a format error
fn string_field<'a>(field: &'static str, value: Option<&'a Value>) -> Result<Option<&'a str>> {
    match value {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.as_str())),
        Some(_) => Err(EventError::format(field, "must be a string")),
    }
}

/// Normalise the caller-supplied request key.
///
/// An absent key is replaced by `PCS-<epoch millis>`; an empty key is kept
/// as-is. Otherwise at most 128 characters of `[A-Za-z0-9_-]` are allowed.
pub fn validate_request_key(key: Option<&str>) -> Result<String> {
    let key = match key {
        None => return Ok(format!("{}{}", REQUEST_KEY_PREFIX, now_millis())),
        Some(key) => key,
    };
    let valid = key.len() <= MAX_REQUEST_KEY_LENGTH
        && key
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-');
    if !valid {
        return Err(EventError::RequestKeyInvalid {
            key: key.to_string(),
        });
    }
    Ok(key.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    const MAX: usize = 16;

    #[test]
    fn test_levels() {
        assert_eq!(validate_level(Some("INFO")).unwrap(), Level::Info);
        assert_eq!(validate_level(Some("WARN")).unwrap(), Level::Warn);
        assert_eq!(validate_level(Some("ERROR")).unwrap(), Level::Error);

        for bad in ["info", "DEBUG", "", "FATAL"] {
            let err = validate_level(Some(bad)).unwrap_err();
            assert_eq!(err.code(), "PR400-EV-0004");
        }
        assert_eq!(validate_level(None).unwrap_err().code(), "PR400-EV-0003");
    }

    #[test]
    fn test_length_boundary() {
        let at_max = "a".repeat(MAX);
        let over = "a".repeat(MAX + 1);

        assert!(validate_action(Some(&at_max), MAX).is_ok());
        assert!(validate_object(Some(&at_max), MAX).is_ok());
        assert!(validate_result(Some(&at_max), MAX).is_ok());

        assert_eq!(validate_action(Some(&over), MAX).unwrap_err().code(), "PR400-EV-0004");
        assert_eq!(validate_object(Some(&over), MAX).unwrap_err().code(), "PR400-EV-0004");
        assert_eq!(validate_result(Some(&over), MAX).unwrap_err().code(), "PR400-EV-0004");
    }

    #[test]
    fn test_length_counts_characters() {
        let multibyte = "あ".repeat(MAX);
        assert!(validate_action(Some(&multibyte), MAX).is_ok());
    }

    #[test]
    fn test_absent_fields_rejected() {
        assert_eq!(validate_action(None, MAX).unwrap_err().code(), "PR400-EV-0003");
        assert_eq!(validate_object(None, MAX).unwrap_err().code(), "PR400-EV-0003");
        assert_eq!(validate_result(None, MAX).unwrap_err().code(), "PR400-EV-0003");
    }

    #[test]
    fn test_parse_event() {
        let event = parse_event(
            r#"{"level":"WARN","action":"POST","object":"/box/col","result":"201"}"#,
            MAX,
        )
        .unwrap();
        assert_eq!(event, Event::new(Level::Warn, "POST", "/box/col", "201"));
    }

    #[test]
    fn test_parse_event_errors() {
        assert_eq!(parse_event("{not json", MAX).unwrap_err().code(), "PR400-EV-0001");
        assert_eq!(
            parse_event(r#"{"level":"INFO","action":"a","object":null,"result":"r"}"#, MAX)
                .unwrap_err()
                .code(),
            "PR400-EV-0003"
        );
        assert_eq!(
            parse_event(r#"{"level":"INFO","action":1,"object":"o","result":"r"}"#, MAX)
                .unwrap_err()
                .code(),
            "PR400-EV-0004"
        );
    }

    #[test]
    fn test_error_payload() {
        let payload = validate_level(Some("LOUD")).unwrap_err().payload();
        assert_eq!(payload.code, "PR400-EV-0004");
        assert_eq!(payload.message.lang, "en");
    }

    #[test]
    fn test_request_key() {
        let generated = validate_request_key(None).unwrap();
        assert!(generated.starts_with("PCS-"));
        assert!(generated[4..].parse::<i64>().is_ok());

        assert_eq!(validate_request_key(Some("")).unwrap(), "");
        assert_eq!(validate_request_key(Some("abc_DEF-123")).unwrap(), "abc_DEF-123");

        let at_max = "k".repeat(MAX_REQUEST_KEY_LENGTH);
        assert_eq!(validate_request_key(Some(&at_max)).unwrap(), at_max);

        let over = "k".repeat(MAX_REQUEST_KEY_LENGTH + 1);
        assert_eq!(validate_request_key(Some(&over)).unwrap_err().code(), "PR400-EV-0002");
        assert_eq!(validate_request_key(Some("a b")).unwrap_err().code(), "PR400-EV-0002");
    }

    #[test]
    fn test_decoded_event_rechecked() {
        let ok = Event::new(Level::Info, "a".repeat(MAX), "o", "r");
        assert!(validate_event(&ok, MAX).is_ok());

        let long = Event::new(Level::Info, "a", "o", "r".repeat(MAX + 1));
        let err = validate_event(&long, MAX).unwrap_err();
        assert_eq!(err.code(), "PR400-EV-0004");
    }
}
