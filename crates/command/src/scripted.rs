//! In-memory command for rehearsing command flows.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;

use crate::command::Command;
use crate::error::CommandError;

/// Shared, ordered log of what scripted commands did.
#[derive(Debug, Clone, Default)]
pub struct Journal {
    entries: Arc<Mutex<Vec<String>>>,
}

impl Journal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an entry.
    pub fn record(&self, entry: impl Into<String>) {
        self.lock().push(entry.into());
    }

    /// Returns a copy of all entries in recording order.
    pub fn entries(&self) -> Vec<String> {
        self.lock().clone()
    }

    /// Returns how many entries equal `entry`.
    pub fn count(&self, entry: &str) -> usize {
        self.lock().iter().filter(|e| e.as_str() == entry).count()
    }

    /// Returns only the entries ending with `suffix`, in order.
    pub fn with_suffix(&self, suffix: &str) -> Vec<String> {
        self.lock()
            .iter()
            .filter(|e| e.ends_with(suffix))
            .cloned()
            .collect()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    fn lock(&self) -> MutexGuard<'_, Vec<String>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[derive(Debug, Default)]
struct ScriptState {
    applied: bool,
    executions: usize,
    fail_on_execute: bool,
    fail_on_undo: bool,
    blocked: bool,
    irreversible: bool,
}

/// A command whose behaviour is scripted up front.
///
/// Each call is written to the [`Journal`] as `"<name>:execute:start"`,
/// `"<name>:execute:end"` (or `"<name>:execute:failed"`) and `"<name>:undo"`.
pub struct ScriptedCommand<T = ()> {
    name: String,
    output: T,
    journal: Journal,
    delay: Option<Duration>,
    state: Mutex<ScriptState>,
}

impl ScriptedCommand<()> {
    /// Creates a scripted command producing `()`.
    pub fn unit(name: impl Into<String>, journal: &Journal) -> Self {
        Self::new(name, (), journal)
    }
}

impl<T> ScriptedCommand<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Creates a scripted command producing `output` on success.
    pub fn new(name: impl Into<String>, output: T, journal: &Journal) -> Self {
        Self {
            name: name.into(),
            output,
            journal: journal.clone(),
            delay: None,
            state: Mutex::new(ScriptState::default()),
        }
    }

    /// Sleeps for `delay` in the middle of every execution.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Makes every execution fail.
    pub fn failing(self) -> Self {
        self.set_fail_on_execute(true);
        self
    }

    /// Makes every undo fail.
    pub fn failing_undo(self) -> Self {
        self.set_fail_on_undo(true);
        self
    }

    /// Makes `can_execute` report false.
    pub fn blocked(self) -> Self {
        self.set_blocked(true);
        self
    }

    /// Makes `can_undo` report false even after execution.
    pub fn irreversible(self) -> Self {
        self.lock().irreversible = true;
        self
    }

    pub fn set_fail_on_execute(&self, fail: bool) {
        self.lock().fail_on_execute = fail;
    }

    pub fn set_fail_on_undo(&self, fail: bool) {
        self.lock().fail_on_undo = fail;
    }

    pub fn set_blocked(&self, blocked: bool) {
        self.lock().blocked = blocked;
    }

    /// Returns how many executions succeeded.
    pub fn executions(&self) -> usize {
        self.lock().executions
    }

    /// Returns true if the command's effect is currently in place.
    pub fn is_applied(&self) -> bool {
        self.lock().applied
    }

    fn lock(&self) -> MutexGuard<'_, ScriptState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl<T> Command for ScriptedCommand<T>
where
    T: Clone + Send + Sync + 'static,
{
    type Output = T;

    async fn execute(&self) -> Result<T, CommandError> {
        self.journal.record(format!("{}:execute:start", self.name));

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        {
            let mut state = self.lock();
            if state.fail_on_execute {
                drop(state);
                self.journal.record(format!("{}:execute:failed", self.name));
                return Err(CommandError::failed(format!("{} failed", self.name)));
            }
            state.applied = true;
            state.executions += 1;
        }

        self.journal.record(format!("{}:execute:end", self.name));
        Ok(self.output.clone())
    }

    async fn undo(&self) -> Result<(), CommandError> {
        let mut state = self.lock();
        if !state.applied || state.irreversible {
            return Err(CommandError::undo_unsupported(self.name.clone()));
        }

        self.journal.record(format!("{}:undo", self.name));
        if state.fail_on_undo {
            return Err(CommandError::failed(format!(
                "{} could not be undone",
                self.name
            )));
        }

        state.applied = false;
        Ok(())
    }

    fn can_execute(&self) -> bool {
        !self.lock().blocked
    }

    fn can_undo(&self) -> bool {
        let state = self.lock();
        state.applied && !state.irreversible
    }

    fn describe(&self) -> String {
        self.name.clone()
    }
}
