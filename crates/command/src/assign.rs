//! Field assignment with undo.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

use async_trait::async_trait;

use crate::command::Command;
use crate::error::CommandError;

/// Replaces the value held by a shared target and restores it on undo.
///
/// The previous value is captured at execution time.
pub struct AssignCommand<T> {
    label: String,
    target: Arc<RwLock<T>>,
    value: T,
    previous: Mutex<Option<T>>,
}

impl<T> AssignCommand<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Creates a command that will store `value` into `target`.
    pub fn new(label: impl Into<String>, target: &Arc<RwLock<T>>, value: T) -> Self {
        Self {
            label: label.into(),
            target: Arc::clone(target),
            value,
            previous: Mutex::new(None),
        }
    }

    /// Returns the value that was replaced by the last execution, if it has
    /// not been undone yet.
    pub fn previous(&self) -> Option<T> {
        self.previous_slot().clone()
    }

    fn previous_slot(&self) -> MutexGuard<'_, Option<T>> {
        self.previous.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl<T> Command for AssignCommand<T>
where
    T: Clone + Send + Sync + 'static,
{
    type Output = T;

    async fn execute(&self) -> Result<T, CommandError> {
        let old = {
            let mut slot = self.target.write().unwrap_or_else(PoisonError::into_inner);
            std::mem::replace(&mut *slot, self.value.clone())
        };
        *self.previous_slot() = Some(old);
        Ok(self.value.clone())
    }

    async fn undo(&self) -> Result<(), CommandError> {
        let Some(old) = self.previous_slot().take() else {
            return Err(CommandError::undo_unsupported(self.label.clone()));
        };
        *self.target.write().unwrap_or_else(PoisonError::into_inner) = old;
        Ok(())
    }

    fn can_undo(&self) -> bool {
        self.previous_slot().is_some()
    }

    fn describe(&self) -> String {
        self.label.clone()
    }
}
