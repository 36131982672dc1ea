//! History error types.

use command::CommandError;
use thiserror::Error;

/// Errors that can occur while operating the command history.
#[derive(Debug, Error)]
pub enum HistoryError {
    /// The command itself refused or failed.
    #[error(transparent)]
    Command(#[from] CommandError),

    #[error("Nothing to undo")]
    NothingToUndo,

    #[error("Nothing to redo")]
    NothingToRedo,
}

impl HistoryError {
    /// Returns the underlying command error, if any.
    pub fn as_command_error(&self) -> Option<&CommandError> {
        match self {
            HistoryError::Command(err) => Some(err),
            _ => None,
        }
    }
}

/// Result type for history operations.
pub type Result<T> = std::result::Result<T, HistoryError>;
