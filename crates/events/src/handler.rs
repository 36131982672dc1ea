//! Event handler trait and closure adapter.

use std::any::type_name;
use std::fmt;

use crate::error::HandlerError;
use crate::event::DomainEvent;

/// Reacts to events of type `E`.
///
/// Handlers may be invoked from any thread, including worker threads of the
/// publisher's pool, and must not assume which one.
pub trait DomainEventHandler<E: DomainEvent>: Send + Sync {
    /// Reacts to one published event.
    ///
    /// An error is logged and counted by the publisher; the remaining
    /// handlers still receive the event.
    fn handle(&self, event: &E) -> Result<(), HandlerError>;

    /// Name used in diagnostics.
    fn name(&self) -> &str {
        type_name::<Self>()
    }
}

/// A handler backed by a closure. Build one with [`handler_fn`].
pub struct FnHandler<F> {
    name: String,
    f: F,
}

impl<F> fmt::Debug for FnHandler<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnHandler").field("name", &self.name).finish()
    }
}

/// Wraps `f` as a named handler.
///
/// ```ignore
/// let handler = handler_fn("log-saves", |event: &DocumentSaved| {
///     tracing::info!(id = %event.event_id(), "saved");
///     Ok(())
/// });
/// ```
pub fn handler_fn<E, F>(name: impl Into<String>, f: F) -> FnHandler<F>
where
    E: DomainEvent,
    F: Fn(&E) -> Result<(), HandlerError> + Send + Sync,
{
    FnHandler {
        name: name.into(),
        f,
    }
}

impl<E, F> DomainEventHandler<E> for FnHandler<F>
where
    E: DomainEvent,
    F: Fn(&E) -> Result<(), HandlerError> + Send + Sync,
{
    fn handle(&self, event: &E) -> Result<(), HandlerError> {
        (self.f)(event)
    }

    fn name(&self) -> &str {
        &self.name
    }
}
