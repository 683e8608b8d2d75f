//! CellBase Events
//!
//! Event records emitted on entity mutation, their validation rules, and the
//! per-cell leveled logger that filters them by severity.

pub mod event;
pub mod logger;
pub mod validate;

pub use event::{Event, Level, RawEvent};
pub use logger::{EventLogger, EventSink, TracingSink};
pub use validate::{
    parse_event, validate_action, validate_event, validate_level, validate_object,
    validate_request_key, validate_result, EventError, DEFAULT_MAX_VALUE_LENGTH,
    MAX_REQUEST_KEY_LENGTH,
};

pub type Result<T> = std::result::Result<T, EventError>;
