//! Command error types.

use thiserror::Error;

/// Errors that can occur while executing or undoing commands.
#[derive(Debug, Error)]
pub enum CommandError {
    /// A command was constructed with malformed arguments.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// A command reported it was not ready when its turn came.
    #[error("Precondition failed for command '{command}'")]
    PreconditionFailed { command: String },

    /// A step of a composite failed; `source` is the original cause.
    #[error("Command '{command}' failed: {source}")]
    ExecutionFailed {
        command: String,
        #[source]
        source: Box<CommandError>,
    },

    /// The operation is not valid for the command in its current state.
    #[error("Operation '{operation}' is not supported by command '{command}' in its current state")]
    UnsupportedOperation {
        command: String,
        operation: &'static str,
    },

    /// An explicit undo reverted what it could but some steps refused.
    #[error("Undo of '{command}' incomplete: failed to undo {failed:?}")]
    RollbackFailed { command: String, failed: Vec<String> },

    /// A step produced a value of a different type than expected.
    #[error("Result type mismatch: expected {expected}, found {found}")]
    TypeMismatch {
        expected: &'static str,
        found: &'static str,
    },

    /// A leaf command failed on its own terms.
    #[error("{0}")]
    Failed(String),
}

impl CommandError {
    /// Creates a leaf failure with the given reason.
    pub fn failed(reason: impl Into<String>) -> Self {
        CommandError::Failed(reason.into())
    }

    /// Creates an `UnsupportedOperation` error for `undo`.
    pub fn undo_unsupported(command: impl Into<String>) -> Self {
        CommandError::UnsupportedOperation {
            command: command.into(),
            operation: "undo",
        }
    }

    /// Returns the name of the command this error is attributed to, if any.
    pub fn command(&self) -> Option<&str> {
        match self {
            CommandError::PreconditionFailed { command }
            | CommandError::ExecutionFailed { command, .. }
            | CommandError::UnsupportedOperation { command, .. }
            | CommandError::RollbackFailed { command, .. } => Some(command),
            _ => None,
        }
    }
}

/// Convenience type alias for command results.
pub type Result<T> = std::result::Result<T, CommandError>;
