//! Events announcing what happened to commands in a history.
//!
//! Events carry the description captured when the operation ran, never the
//! command itself.

use std::fmt;

use chrono::{DateTime, Utc};
use common::{EventId, SequenceNumber};
use events::{DomainEvent, EventMetadata};
use serde::{Deserialize, Serialize};

/// The history operation an event refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandOperation {
    Execute,
    Undo,
    Redo,
}

impl CommandOperation {
    pub fn as_str(&self) -> &'static str {
        match self {
            CommandOperation::Execute => "execute",
            CommandOperation::Undo => "undo",
            CommandOperation::Redo => "redo",
        }
    }
}

impl fmt::Display for CommandOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A command executed successfully and was recorded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandExecutedEvent {
    #[serde(flatten)]
    pub metadata: EventMetadata,
    pub sequence: SequenceNumber,
    pub description: String,
}

/// The most recent command was undone and moved to the redo stack.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandUndoneEvent {
    #[serde(flatten)]
    pub metadata: EventMetadata,
    pub sequence: SequenceNumber,
    pub description: String,
}

/// An undone command was executed again.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandRedoneEvent {
    #[serde(flatten)]
    pub metadata: EventMetadata,
    /// The sequence assigned on redo.
    pub sequence: SequenceNumber,
    /// The sequence the command had before it was undone.
    pub previous_sequence: SequenceNumber,
    pub description: String,
}

/// A history operation failed; the history is unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandFailedEvent {
    #[serde(flatten)]
    pub metadata: EventMetadata,
    pub operation: CommandOperation,
    pub description: String,
    pub reason: String,
}

macro_rules! domain_event {
    ($event:ty, $name:literal) => {
        impl DomainEvent for $event {
            fn event_id(&self) -> EventId {
                self.metadata.event_id
            }

            fn occurred_on(&self) -> DateTime<Utc> {
                self.metadata.occurred_on
            }

            fn event_type(&self) -> &'static str {
                $name
            }
        }
    };
}

domain_event!(CommandExecutedEvent, "CommandExecuted");
domain_event!(CommandUndoneEvent, "CommandUndone");
domain_event!(CommandRedoneEvent, "CommandRedone");
domain_event!(CommandFailedEvent, "CommandFailed");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failed_event_serialization() {
        let event = CommandFailedEvent {
            metadata: EventMetadata::new(),
            operation: CommandOperation::Undo,
            description: "rename".to_string(),
            reason: "locked".to_string(),
        };

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["operation"], "undo");
        assert_eq!(json["event_id"], event.event_id().to_string());

        let back: CommandFailedEvent = serde_json::from_value(json).unwrap();
        assert_eq!(back, event);
    }

    #[test]
    fn test_event_type_names() {
        let executed = CommandExecutedEvent {
            metadata: EventMetadata::new(),
            sequence: SequenceNumber::first(),
            description: "rename".to_string(),
        };
        assert_eq!(executed.event_type(), "CommandExecuted");
        assert_eq!(CommandOperation::Redo.to_string(), "redo");
    }
}
