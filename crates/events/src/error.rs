//! Event bus error types.

use thiserror::Error;

/// Errors returned by the publisher itself.
#[derive(Debug, Error)]
pub enum PublisherError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

/// Failure reported by a handler for one event.
///
/// The publisher logs and counts these; they never reach the publishing side.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{reason}")]
pub struct HandlerError {
    reason: String,
}

impl HandlerError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }

    pub fn reason(&self) -> &str {
        &self.reason
    }
}

impl From<String> for HandlerError {
    fn from(reason: String) -> Self {
        Self::new(reason)
    }
}

impl From<&str> for HandlerError {
    fn from(reason: &str) -> Self {
        Self::new(reason)
    }
}

/// Result type for publisher operations.
pub type Result<T> = std::result::Result<T, PublisherError>;
