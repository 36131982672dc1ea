//! Handler registry and per-handler isolated delivery.

use std::any::{Any, TypeId, type_name};
use std::collections::HashMap;
use std::marker::PhantomData;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::error::HandlerError;
use crate::event::DomainEvent;
use crate::handler::DomainEventHandler;

/// Counts from one synchronous delivery.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchOutcome {
    /// Handlers that were invoked.
    pub handlers: usize,
    /// Invocations that returned an error or panicked.
    pub failures: usize,
}

impl DispatchOutcome {
    /// Returns the number of handlers that completed without error.
    pub fn delivered(&self) -> usize {
        self.handlers - self.failures
    }
}

trait ErasedHandler: Send + Sync {
    fn handle_any(&self, event: &dyn Any) -> Result<(), HandlerError>;
}

struct Typed<E, H: ?Sized> {
    handler: Arc<H>,
    _event: PhantomData<fn(&E)>,
}

impl<E, H> ErasedHandler for Typed<E, H>
where
    E: DomainEvent,
    H: DomainEventHandler<E> + ?Sized,
{
    fn handle_any(&self, event: &dyn Any) -> Result<(), HandlerError> {
        match event.downcast_ref::<E>() {
            Some(event) => self.handler.handle(event),
            None => Err(HandlerError::new(format!(
                "handler for {} received a different event type",
                type_name::<E>()
            ))),
        }
    }
}

#[derive(Clone)]
pub(crate) struct HandlerEntry {
    key: usize,
    name: String,
    handler: Arc<dyn ErasedHandler>,
}

/// An immutable view of the handlers registered for one event type.
pub(crate) type Snapshot = Arc<[HandlerEntry]>;

fn handler_key<H: ?Sized>(handler: &Arc<H>) -> usize {
    Arc::as_ptr(handler) as *const () as usize
}

/// Maps event types to their handlers.
///
/// Each list is replaced wholesale on change, so a snapshot taken before a
/// delivery stays valid while handlers register or unregister.
#[derive(Default)]
pub(crate) struct HandlerRegistry {
    slots: RwLock<HashMap<TypeId, Snapshot>>,
}

impl HandlerRegistry {
    pub(crate) fn register<E, H>(&self, handler: Arc<H>)
    where
        E: DomainEvent,
        H: DomainEventHandler<E> + ?Sized + 'static,
    {
        let entry = HandlerEntry {
            key: handler_key(&handler),
            name: handler.name().to_string(),
            handler: Arc::new(Typed::<E, H> {
                handler,
                _event: PhantomData,
            }),
        };

        let mut slots = self.write();
        let slot = slots.entry(TypeId::of::<E>()).or_insert_with(|| Arc::from(Vec::new()));
        let mut entries = slot.to_vec();
        entries.push(entry);
        *slot = Arc::from(entries);
    }

    /// Removes the registration of this exact handler instance.
    pub(crate) fn unregister<E, H>(&self, handler: &Arc<H>) -> bool
    where
        E: DomainEvent,
        H: ?Sized,
    {
        let key = handler_key(handler);
        let event = TypeId::of::<E>();
        let mut slots = self.write();
        let Some(current) = slots.get(&event) else {
            return false;
        };
        let Some(position) = current.iter().position(|entry| entry.key == key) else {
            return false;
        };

        let mut entries = current.to_vec();
        entries.remove(position);
        if entries.is_empty() {
            slots.remove(&event);
        } else {
            slots.insert(event, Arc::from(entries));
        }
        true
    }

    pub(crate) fn snapshot<E: DomainEvent>(&self) -> Option<Snapshot> {
        self.read().get(&TypeId::of::<E>()).cloned()
    }

    pub(crate) fn count<E: DomainEvent>(&self) -> usize {
        self.read()
            .get(&TypeId::of::<E>())
            .map_or(0, |entries| entries.len())
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<TypeId, Snapshot>> {
        self.slots.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<TypeId, Snapshot>> {
        self.slots.write().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Invokes every handler in `handlers` with `event`, in order.
///
/// A handler that errors or panics is logged and counted; the remaining
/// handlers still run.
pub(crate) fn deliver<E: DomainEvent>(event: &E, handlers: &[HandlerEntry]) -> DispatchOutcome {
    let event_type = event.event_type();
    let mut outcome = DispatchOutcome {
        handlers: handlers.len(),
        failures: 0,
    };

    for entry in handlers {
        let result = panic::catch_unwind(AssertUnwindSafe(|| entry.handler.handle_any(event)));
        let failure = match result {
            Ok(Ok(())) => continue,
            Ok(Err(err)) => err.to_string(),
            Err(payload) => panic_message(payload.as_ref()),
        };

        outcome.failures += 1;
        tracing::error!(
            event_type,
            event_id = %event.event_id(),
            handler = %entry.name,
            error = %failure,
            "event handler failed"
        );
        metrics::counter!("event_handler_failures_total", "event_type" => event_type).increment(1);
    }

    outcome
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        format!("panicked: {message}")
    } else if let Some(message) = payload.downcast_ref::<String>() {
        format!("panicked: {message}")
    } else {
        "panicked".to_string()
    }
}
