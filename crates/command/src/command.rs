//! The command abstraction and its type-erased form.

use std::any::{Any, TypeId, type_name};
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::CommandError;

/// A reversible unit of work.
///
/// Commands take `&self` so they can be shared through `Arc` between their
/// creator and the history that records them. Variants that need before/after
/// values for undo keep them behind interior mutability.
///
/// Callers should treat `can_execute` and `can_undo` as advisory checks: they
/// must be cheap and must not have side effects.
#[async_trait]
pub trait Command: Send + Sync {
    /// The value produced by a successful execution.
    type Output: Send + 'static;

    /// Performs the unit of work once.
    async fn execute(&self) -> Result<Self::Output, CommandError>;

    /// Reverses the effect of a prior successful `execute`.
    ///
    /// Implementations fail with [`CommandError::UnsupportedOperation`] when
    /// `can_undo` is false.
    async fn undo(&self) -> Result<(), CommandError>;

    /// Returns true if the command is ready to run.
    fn can_execute(&self) -> bool {
        true
    }

    /// Returns true if `undo` is currently valid.
    fn can_undo(&self) -> bool;

    /// Returns a stable, human-readable label.
    fn describe(&self) -> String;
}

#[async_trait]
impl<C> Command for Arc<C>
where
    C: Command + ?Sized,
{
    type Output = C::Output;

    async fn execute(&self) -> Result<Self::Output, CommandError> {
        (**self).execute().await
    }

    async fn undo(&self) -> Result<(), CommandError> {
        (**self).undo().await
    }

    fn can_execute(&self) -> bool {
        (**self).can_execute()
    }

    fn can_undo(&self) -> bool {
        (**self).can_undo()
    }

    fn describe(&self) -> String {
        (**self).describe()
    }
}

/// Object-safe view of a [`Command`] whose output type has been erased.
///
/// Composites and histories hold heterogeneous commands through this trait;
/// only the party that knows the concrete output type downcasts it back.
#[async_trait]
pub trait AnyCommand: Send + Sync {
    /// Executes the command and returns its output as an opaque value.
    async fn execute_any(&self) -> Result<Box<dyn Any + Send>, CommandError>;

    /// Reverses a prior successful execution.
    async fn undo(&self) -> Result<(), CommandError>;

    /// Returns true if the command is ready to run.
    fn can_execute(&self) -> bool;

    /// Returns true if `undo` is currently valid.
    fn can_undo(&self) -> bool;

    /// Returns a stable, human-readable label.
    fn describe(&self) -> String;

    /// Returns the `TypeId` of the erased output.
    fn output_type_id(&self) -> TypeId;

    /// Returns the name of the erased output type.
    fn output_type_name(&self) -> &'static str;
}

/// A shared, type-erased command.
pub type BoxedCommand = Arc<dyn AnyCommand>;

struct Erased<C>(Arc<C>);

#[async_trait]
impl<C> AnyCommand for Erased<C>
where
    C: Command + 'static,
{
    async fn execute_any(&self) -> Result<Box<dyn Any + Send>, CommandError> {
        let output = self.0.execute().await?;
        Ok(Box::new(output))
    }

    async fn undo(&self) -> Result<(), CommandError> {
        self.0.undo().await
    }

    fn can_execute(&self) -> bool {
        self.0.can_execute()
    }

    fn can_undo(&self) -> bool {
        self.0.can_undo()
    }

    fn describe(&self) -> String {
        self.0.describe()
    }

    fn output_type_id(&self) -> TypeId {
        TypeId::of::<C::Output>()
    }

    fn output_type_name(&self) -> &'static str {
        type_name::<C::Output>()
    }
}

/// Erases the output type of `command`.
pub fn boxed<C>(command: C) -> BoxedCommand
where
    C: Command + 'static,
{
    Arc::new(Erased(Arc::new(command)))
}

/// Erases the output type of a shared command, keeping the caller's handle usable.
pub fn boxed_arc<C>(command: Arc<C>) -> BoxedCommand
where
    C: Command + 'static,
{
    Arc::new(Erased(command))
}

/// Recovers a concrete output from an erased execution result.
pub fn downcast_output<R: 'static>(
    output: Box<dyn Any + Send>,
    found: &'static str,
) -> Result<R, CommandError> {
    output
        .downcast::<R>()
        .map(|value| *value)
        .map_err(|_| CommandError::TypeMismatch {
            expected: type_name::<R>(),
            found,
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};

    struct Answer {
        done: AtomicBool,
    }

    #[async_trait]
    impl Command for Answer {
        type Output = u32;

        async fn execute(&self) -> Result<u32, CommandError> {
            self.done.store(true, Ordering::SeqCst);
            Ok(42)
        }

        async fn undo(&self) -> Result<(), CommandError> {
            if !self.can_undo() {
                return Err(CommandError::undo_unsupported(self.describe()));
            }
            self.done.store(false, Ordering::SeqCst);
            Ok(())
        }

        fn can_undo(&self) -> bool {
            self.done.load(Ordering::SeqCst)
        }

        fn describe(&self) -> String {
            "answer".to_string()
        }
    }

    fn answer() -> Answer {
        Answer {
            done: AtomicBool::new(false),
        }
    }

    #[tokio::test]
    async fn test_erased_command_round_trips_output() {
        let erased = boxed(answer());
        assert_eq!(erased.output_type_id(), TypeId::of::<u32>());
        assert_eq!(erased.output_type_name(), "u32");

        let output = erased.execute_any().await.unwrap();
        let value: u32 = downcast_output(output, erased.output_type_name()).unwrap();
        assert_eq!(value, 42);
        assert!(erased.can_undo());
    }

    #[tokio::test]
    async fn test_downcast_to_wrong_type_is_reported() {
        let erased = boxed(answer());
        let output = erased.execute_any().await.unwrap();
        let err = downcast_output::<String>(output, erased.output_type_name()).unwrap_err();
        assert!(matches!(err, CommandError::TypeMismatch { found: "u32", .. }));
    }

    #[tokio::test]
    async fn test_boxed_arc_shares_state_with_caller() {
        let shared = Arc::new(answer());
        let erased = boxed_arc(shared.clone());

        erased.execute_any().await.unwrap();
        assert!(shared.can_undo());

        erased.undo().await.unwrap();
        assert!(!shared.can_undo());
    }

    #[tokio::test]
    async fn test_undo_without_execute_is_unsupported() {
        let cmd = answer();
        let err = cmd.undo().await.unwrap_err();
        assert!(matches!(err, CommandError::UnsupportedOperation { .. }));
    }
}
