//! Sequential multi-step commands with optional rollback.

use std::any::{TypeId, type_name};
use std::marker::PhantomData;
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;

use crate::command::{BoxedCommand, Command, downcast_output};
use crate::error::CommandError;

/// The children that actually ran during one execution attempt, in the
/// order they ran.
///
/// Every call to `execute` builds its own attempt; the composite only keeps
/// the last finished one so that `undo` knows what to revert.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecutionAttempt {
    executed: Vec<usize>,
}

impl ExecutionAttempt {
    fn record(&mut self, index: usize) {
        self.executed.push(index);
    }

    /// Returns the indices of the executed children, in execution order.
    pub fn executed(&self) -> &[usize] {
        &self.executed
    }

    /// Returns true if no child was executed.
    pub fn is_empty(&self) -> bool {
        self.executed.is_empty()
    }

    /// Returns the number of executed children.
    pub fn len(&self) -> usize {
        self.executed.len()
    }
}

#[derive(Debug)]
struct UndoFailure {
    index: usize,
    command: String,
}

#[derive(Debug, Default)]
struct RollbackReport {
    undone: usize,
    skipped: usize,
    failures: Vec<UndoFailure>,
}

impl RollbackReport {
    /// Children whose undo failed stay recorded so a later undo can retry them.
    fn remaining(&self) -> ExecutionAttempt {
        let mut executed: Vec<usize> = self.failures.iter().map(|f| f.index).collect();
        executed.sort_unstable();
        ExecutionAttempt { executed }
    }

    fn failed_commands(&self) -> Vec<String> {
        self.failures
            .iter()
            .map(|failure| failure.command.clone())
            .collect()
    }
}

/// A command built from an ordered, fixed list of sub-commands.
///
/// Children run strictly one after another. When a child is not ready or
/// fails, the composite fails with [`CommandError::PreconditionFailed`] or
/// [`CommandError::ExecutionFailed`]; with `rollback_on_failure` set, the
/// children that already ran are undone in reverse order first.
///
/// The output of the child at `result_index` becomes the composite's output.
///
/// ```text
/// execute:  c0 ──► c1 ──► c2 ──► ... ──► cn      (ok: output of c[result_index])
/// failure at ci:   undo c(i-1) ──► ... ──► undo c0   (only with rollback)
/// ```
pub struct CompositeCommand<R> {
    description: String,
    children: Vec<BoxedCommand>,
    rollback_on_failure: bool,
    result_index: usize,
    last_attempt: Mutex<ExecutionAttempt>,
    _result: PhantomData<fn() -> R>,
}

impl<R> std::fmt::Debug for CompositeCommand<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompositeCommand")
            .field("description", &self.description)
            .field("steps", &self.children.len())
            .field("rollback_on_failure", &self.rollback_on_failure)
            .field("result_index", &self.result_index)
            .finish()
    }
}

impl<R> CompositeCommand<R>
where
    R: Send + 'static,
{
    /// Creates a composite command.
    ///
    /// Fails with [`CommandError::InvalidArgument`] if `children` is empty,
    /// if `result_index` is out of range, or if the child at `result_index`
    /// does not produce an `R`.
    pub fn new(
        description: impl Into<String>,
        rollback_on_failure: bool,
        result_index: usize,
        children: Vec<BoxedCommand>,
    ) -> Result<Self, CommandError> {
        let description = description.into();

        if children.is_empty() {
            return Err(CommandError::InvalidArgument(format!(
                "composite '{description}' needs at least one command"
            )));
        }

        let Some(result_step) = children.get(result_index) else {
            return Err(CommandError::InvalidArgument(format!(
                "result index {result_index} is out of range for composite '{description}' with {} commands",
                children.len()
            )));
        };

        if result_step.output_type_id() != TypeId::of::<R>() {
            return Err(CommandError::InvalidArgument(format!(
                "result step '{}' of composite '{description}' produces {}, expected {}",
                result_step.describe(),
                result_step.output_type_name(),
                type_name::<R>()
            )));
        }

        Ok(Self {
            description,
            children,
            rollback_on_failure,
            result_index,
            last_attempt: Mutex::new(ExecutionAttempt::default()),
            _result: PhantomData,
        })
    }

    /// Returns the composite's description.
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Returns the number of child commands.
    pub fn len(&self) -> usize {
        self.children.len()
    }

    /// Always false; construction rejects empty composites.
    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }

    pub fn rollback_on_failure(&self) -> bool {
        self.rollback_on_failure
    }

    pub fn result_index(&self) -> usize {
        self.result_index
    }

    /// Returns the last finished execution attempt.
    pub fn last_attempt(&self) -> ExecutionAttempt {
        self.attempt_slot().clone()
    }

    /// Returns the descriptions of the children recorded in the last attempt.
    pub fn executed_steps(&self) -> Vec<String> {
        self.last_attempt()
            .executed()
            .iter()
            .filter_map(|&index| self.children.get(index))
            .map(|child| child.describe())
            .collect()
    }

    fn attempt_slot(&self) -> MutexGuard<'_, ExecutionAttempt> {
        self.last_attempt
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn store_attempt(&self, attempt: ExecutionAttempt) {
        *self.attempt_slot() = attempt;
    }

    fn attempt_is_undoable(&self, attempt: &ExecutionAttempt) -> bool {
        !attempt.is_empty()
            && attempt
                .executed()
                .iter()
                .all(|&index| self.children.get(index).is_some_and(|c| c.can_undo()))
    }

    #[tracing::instrument(skip(self), fields(command = %self.description, steps = self.children.len()))]
    async fn run(&self) -> Result<R, CommandError> {
        let mut attempt = ExecutionAttempt::default();
        let mut result = None;

        for (index, child) in self.children.iter().enumerate() {
            if !child.can_execute() {
                let error = CommandError::PreconditionFailed {
                    command: child.describe(),
                };
                return Err(self.abort(attempt, error).await);
            }

            match child.execute_any().await {
                Ok(output) => {
                    attempt.record(index);
                    if index == self.result_index {
                        match downcast_output::<R>(output, child.output_type_name()) {
                            Ok(value) => result = Some(value),
                            Err(error) => return Err(self.abort(attempt, error).await),
                        }
                    }
                }
                Err(source) => {
                    let error = CommandError::ExecutionFailed {
                        command: child.describe(),
                        source: Box::new(source),
                    };
                    return Err(self.abort(attempt, error).await);
                }
            }
        }

        self.store_attempt(attempt);
        tracing::debug!("composite completed");

        result.ok_or_else(|| CommandError::TypeMismatch {
            expected: type_name::<R>(),
            found: "nothing",
        })
    }

    /// Applies the failure policy and hands back the error the caller sees.
    async fn abort(&self, attempt: ExecutionAttempt, error: CommandError) -> CommandError {
        tracing::warn!(
            error = %error,
            executed = attempt.len(),
            rollback = self.rollback_on_failure,
            "composite step failed"
        );

        if self.rollback_on_failure {
            metrics::counter!("composite_rollbacks_total").increment(1);
            let report = self.rollback(&attempt).await;
            if !report.failures.is_empty() {
                tracing::warn!(
                    failed = ?report.failed_commands(),
                    "rollback left effects in place"
                );
            }
            self.store_attempt(report.remaining());
        } else {
            self.store_attempt(attempt);
        }

        error
    }

    /// Undoes the executed children in reverse order, one at a time.
    ///
    /// Children that cannot be undone are skipped. A failing undo is recorded
    /// and the walk continues with the earlier children.
    async fn rollback(&self, attempt: &ExecutionAttempt) -> RollbackReport {
        let mut report = RollbackReport::default();

        for &index in attempt.executed().iter().rev() {
            let Some(child) = self.children.get(index) else {
                continue;
            };
            let step = child.describe();

            if !child.can_undo() {
                tracing::debug!(%step, "step cannot be undone, skipping");
                report.skipped += 1;
                continue;
            }

            match child.undo().await {
                Ok(()) => {
                    tracing::debug!(%step, "step undone");
                    report.undone += 1;
                }
                Err(error) => {
                    tracing::warn!(%step, error = %error, "undo failed, continuing rollback");
                    metrics::counter!("composite_undo_failures_total").increment(1);
                    report.failures.push(UndoFailure {
                        index,
                        command: step,
                    });
                }
            }
        }

        tracing::debug!(
            undone = report.undone,
            skipped = report.skipped,
            failed = report.failures.len(),
            "rollback finished"
        );

        report
    }
}

#[async_trait]
impl<R> Command for CompositeCommand<R>
where
    R: Send + 'static,
{
    type Output = R;

    async fn execute(&self) -> Result<R, CommandError> {
        self.run().await
    }

    async fn undo(&self) -> Result<(), CommandError> {
        let attempt = self.last_attempt();
        if !self.attempt_is_undoable(&attempt) {
            return Err(CommandError::undo_unsupported(self.description.clone()));
        }

        let report = self.rollback(&attempt).await;
        let failed = report.failed_commands();
        self.store_attempt(report.remaining());

        if failed.is_empty() {
            Ok(())
        } else {
            Err(CommandError::RollbackFailed {
                command: self.description.clone(),
                failed,
            })
        }
    }

    /// True iff every child is ready; every child is asked.
    fn can_execute(&self) -> bool {
        self.children
            .iter()
            .fold(true, |ready, child| child.can_execute() & ready)
    }

    fn can_undo(&self) -> bool {
        let attempt = self.last_attempt();
        self.attempt_is_undoable(&attempt)
    }

    fn describe(&self) -> String {
        self.description.clone()
    }
}
