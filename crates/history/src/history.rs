//! Undo/redo command history.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Instant;

use command::{BoxedCommand, Command, CommandError, boxed_arc};
use common::SequenceNumber;
use events::{DomainEvent, DomainEventPublisher, EventMetadata};
use tokio::sync::Mutex;

use crate::config::{DispatchMode, HistoryConfig};
use crate::error::{HistoryError, Result};
use crate::lifecycle::{
    CommandExecutedEvent, CommandFailedEvent, CommandOperation, CommandRedoneEvent,
    CommandUndoneEvent,
};
use crate::record::{CommandRecord, CommandSummary};

struct Stacks {
    /// Oldest first; the back is the next to undo.
    undo: VecDeque<CommandRecord>,
    /// The last element is the next to redo.
    redo: Vec<CommandRecord>,
    next_sequence: SequenceNumber,
}

impl Stacks {
    fn new() -> Self {
        Self {
            undo: VecDeque::new(),
            redo: Vec::new(),
            next_sequence: SequenceNumber::first(),
        }
    }

    fn allocate(&mut self) -> SequenceNumber {
        let sequence = self.next_sequence;
        self.next_sequence = sequence.next();
        sequence
    }

    fn trim(&mut self, max_depth: Option<usize>) {
        let Some(max_depth) = max_depth.filter(|&depth| depth > 0) else {
            return;
        };
        while self.undo.len() > max_depth {
            if let Some(dropped) = self.undo.pop_front() {
                tracing::debug!(
                    sequence = %dropped.sequence,
                    command = %dropped.description,
                    "history depth exceeded, forgetting oldest command"
                );
            }
        }
    }
}

/// Records executed commands so they can be undone and redone.
///
/// Operations are serialized: while one runs, the others wait. Every
/// operation announces its outcome on the publisher, in the order the
/// operations happen; in [`DispatchMode::Async`] they travel through the
/// publisher's ordered lane, so handlers still see them in that order.
///
/// Only successfully executed commands that have not been undone sit on the
/// undo stack. Executing a new command discards everything on the redo stack.
pub struct CommandHistory {
    publisher: Arc<DomainEventPublisher>,
    config: HistoryConfig,
    stacks: Mutex<Stacks>,
}

impl std::fmt::Debug for CommandHistory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandHistory")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl CommandHistory {
    pub fn new(publisher: Arc<DomainEventPublisher>, config: HistoryConfig) -> Self {
        Self {
            publisher,
            config,
            stacks: Mutex::new(Stacks::new()),
        }
    }

    pub fn config(&self) -> &HistoryConfig {
        &self.config
    }

    pub fn publisher(&self) -> &Arc<DomainEventPublisher> {
        &self.publisher
    }

    /// Executes `command` and records it on success.
    pub async fn execute<C>(&self, command: C) -> Result<C::Output>
    where
        C: Command + 'static,
    {
        self.execute_shared(Arc::new(command)).await
    }

    /// Executes a command the caller keeps a handle to.
    #[tracing::instrument(skip_all, fields(command = %command.describe()))]
    pub async fn execute_shared<C>(&self, command: Arc<C>) -> Result<C::Output>
    where
        C: Command + 'static,
    {
        let mut stacks = self.stacks.lock().await;
        let description = command.describe();

        if !command.can_execute() {
            let error = CommandError::PreconditionFailed {
                command: description.clone(),
            };
            self.announce_failure(CommandOperation::Execute, &description, &error).await;
            return Err(error.into());
        }

        let started = Instant::now();
        let result = command.execute().await;
        record_duration(CommandOperation::Execute, started);

        let output = match result {
            Ok(output) => output,
            Err(error) => {
                self.announce_failure(CommandOperation::Execute, &description, &error).await;
                return Err(error.into());
            }
        };

        let sequence = stacks.allocate();
        stacks
            .undo
            .push_back(CommandRecord::new(sequence, description.clone(), boxed_arc(command)));
        let discarded = stacks.redo.len();
        stacks.redo.clear();
        stacks.trim(self.config.max_depth);

        tracing::debug!(%sequence, discarded_redo = discarded, "command recorded");
        count_success(CommandOperation::Execute);
        self.announce(CommandExecutedEvent {
            metadata: EventMetadata::new(),
            sequence,
            description,
        })
        .await;

        Ok(output)
    }

    /// Undoes the most recently executed command.
    ///
    /// If the command cannot be undone, or its undo fails, it stays where it
    /// is and the error is returned.
    #[tracing::instrument(skip(self))]
    pub async fn undo(&self) -> Result<CommandSummary> {
        let mut stacks = self.stacks.lock().await;
        let Some(top) = stacks.undo.back() else {
            return Err(HistoryError::NothingToUndo);
        };
        let command = top.command.clone();
        let description = top.description.clone();

        if !command.can_undo() {
            let error = CommandError::undo_unsupported(description.clone());
            self.announce_failure(CommandOperation::Undo, &description, &error).await;
            return Err(error.into());
        }

        let started = Instant::now();
        let result = command.undo().await;
        record_duration(CommandOperation::Undo, started);

        if let Err(error) = result {
            self.announce_failure(CommandOperation::Undo, &description, &error).await;
            return Err(error.into());
        }

        let Some(record) = stacks.undo.pop_back() else {
            return Err(HistoryError::NothingToUndo);
        };
        let summary = record.summary();
        stacks.redo.push(record);

        tracing::debug!(sequence = %summary.sequence, "command undone");
        count_success(CommandOperation::Undo);
        self.announce(CommandUndoneEvent {
            metadata: EventMetadata::new(),
            sequence: summary.sequence,
            description: summary.description.clone(),
        })
        .await;

        Ok(summary)
    }

    /// Executes the most recently undone command again.
    ///
    /// The command goes back on the undo stack under a new sequence number.
    /// On failure it stays on the redo stack.
    #[tracing::instrument(skip(self))]
    pub async fn redo(&self) -> Result<CommandSummary> {
        let mut stacks = self.stacks.lock().await;
        let Some(top) = stacks.redo.last() else {
            return Err(HistoryError::NothingToRedo);
        };
        let command: BoxedCommand = top.command.clone();
        let description = top.description.clone();

        if !command.can_execute() {
            let error = CommandError::PreconditionFailed {
                command: description.clone(),
            };
            self.announce_failure(CommandOperation::Redo, &description, &error).await;
            return Err(error.into());
        }

        let started = Instant::now();
        let result = command.execute_any().await;
        record_duration(CommandOperation::Redo, started);

        if let Err(error) = result {
            self.announce_failure(CommandOperation::Redo, &description, &error).await;
            return Err(error.into());
        }

        let Some(previous) = stacks.redo.pop() else {
            return Err(HistoryError::NothingToRedo);
        };
        let sequence = stacks.allocate();
        let record = CommandRecord::new(sequence, previous.description, previous.command);
        let summary = record.summary();
        stacks.undo.push_back(record);
        stacks.trim(self.config.max_depth);

        tracing::debug!(%sequence, previous_sequence = %previous.sequence, "command redone");
        count_success(CommandOperation::Redo);
        self.announce(CommandRedoneEvent {
            metadata: EventMetadata::new(),
            sequence,
            previous_sequence: previous.sequence,
            description: summary.description.clone(),
        })
        .await;

        Ok(summary)
    }

    /// Returns true if the most recent command can be undone now.
    pub async fn can_undo(&self) -> bool {
        let stacks = self.stacks.lock().await;
        stacks.undo.back().is_some_and(|top| top.command.can_undo())
    }

    /// Returns true if there is a command to redo that is ready to run.
    pub async fn can_redo(&self) -> bool {
        let stacks = self.stacks.lock().await;
        stacks.redo.last().is_some_and(|top| top.command.can_execute())
    }

    /// Descriptions on the undo stack, next to undo first.
    pub async fn undo_descriptions(&self) -> Vec<String> {
        let stacks = self.stacks.lock().await;
        stacks
            .undo
            .iter()
            .rev()
            .map(|record| record.description.clone())
            .collect()
    }

    /// Descriptions on the redo stack, next to redo first.
    pub async fn redo_descriptions(&self) -> Vec<String> {
        let stacks = self.stacks.lock().await;
        stacks
            .redo
            .iter()
            .rev()
            .map(|record| record.description.clone())
            .collect()
    }

    /// Number of commands that can be undone.
    pub async fn len(&self) -> usize {
        self.stacks.lock().await.undo.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.stacks.lock().await.undo.is_empty()
    }

    /// Forgets every recorded command. Effects already applied stay applied.
    pub async fn clear(&self) {
        let mut stacks = self.stacks.lock().await;
        let forgotten = stacks.undo.len() + stacks.redo.len();
        stacks.undo.clear();
        stacks.redo.clear();
        tracing::debug!(forgotten, "history cleared");
    }

    async fn announce<E: DomainEvent>(&self, event: E) {
        match self.config.dispatch {
            DispatchMode::Sync => {
                self.publisher.publish(&event);
            }
            DispatchMode::Async => self.publisher.publish_sequenced(event).await,
        }
    }

    async fn announce_failure(
        &self,
        operation: CommandOperation,
        description: &str,
        error: &CommandError,
    ) {
        tracing::warn!(%operation, command = description, error = %error, "command operation failed");
        metrics::counter!(
            "commands_executed_total",
            "operation" => operation.as_str(),
            "outcome" => "failed"
        )
        .increment(1);

        self.announce(CommandFailedEvent {
            metadata: EventMetadata::new(),
            operation,
            description: description.to_string(),
            reason: error.to_string(),
        })
        .await;
    }
}

fn count_success(operation: CommandOperation) {
    metrics::counter!(
        "commands_executed_total",
        "operation" => operation.as_str(),
        "outcome" => "succeeded"
    )
    .increment(1);
}

fn record_duration(operation: CommandOperation, started: Instant) {
    metrics::histogram!("command_duration_seconds", "operation" => operation.as_str())
        .record(started.elapsed().as_secs_f64());
}
