use cb_common::CodedError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DocError {
    #[error("Required field missing from stored document: {key}")]
    MissingField { key: String },

    #[error("Stored field {key} is not a {expected}")]
    InvalidField { key: String, expected: &'static str },
}

impl DocError {
    pub fn missing(key: impl Into<String>) -> Self {
        Self::MissingField { key: key.into() }
    }

    pub fn invalid(key: impl Into<String>, expected: &'static str) -> Self {
        Self::InvalidField {
            key: key.into(),
            expected,
        }
    }
}

impl CodedError for DocError {
    fn code(&self) -> &'static str {
        // Malformed stored documents are a data-store fault, not a client error
        "PR500-SV-0002"
    }
}
