//! Error types for wire decoding and payload validation.

use thiserror::Error;

/// Errors raised while decoding frames or validating event payloads.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoreError {
    #[error("Malformed frame: {0}")]
    MalformedFrame(String),

    #[error("Invalid payload for '{event}': {reason}")]
    InvalidPayload { event: &'static str, reason: String },

    #[error("Serialization failed: {0}")]
    Serialization(String),
}

pub type CoreResult<T> = Result<T, CoreError>;

impl CoreError {
    pub fn invalid_payload(event: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidPayload {
            event,
            reason: reason.into(),
        }
    }
}
