//! Entries of a command history.

use chrono::{DateTime, Utc};
use command::BoxedCommand;
use common::SequenceNumber;
use serde::{Deserialize, Serialize};

/// A successfully executed command held by the history.
pub(crate) struct CommandRecord {
    pub(crate) sequence: SequenceNumber,
    pub(crate) description: String,
    pub(crate) command: BoxedCommand,
    pub(crate) recorded_at: DateTime<Utc>,
}

impl CommandRecord {
    pub(crate) fn new(sequence: SequenceNumber, description: String, command: BoxedCommand) -> Self {
        Self {
            sequence,
            description,
            command,
            recorded_at: Utc::now(),
        }
    }

    pub(crate) fn summary(&self) -> CommandSummary {
        CommandSummary {
            sequence: self.sequence,
            description: self.description.clone(),
            recorded_at: self.recorded_at,
        }
    }
}

/// What an undo or redo acted on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandSummary {
    pub sequence: SequenceNumber,
    pub description: String,
    pub recorded_at: DateTime<Utc>,
}
