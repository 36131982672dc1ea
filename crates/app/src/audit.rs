//! Audit trail of command lifecycle events.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use common::EventId;
use events::{DomainEvent, DomainEventHandler, DomainEventPublisher, HandlerError};
use history::{CommandExecutedEvent, CommandFailedEvent, CommandRedoneEvent, CommandUndoneEvent};
use serde::Serialize;

/// One line of the audit trail.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuditEntry {
    pub event_id: EventId,
    pub occurred_on: DateTime<Utc>,
    pub event_type: &'static str,
    pub description: String,
    /// The full event as JSON.
    pub detail: serde_json::Value,
}

/// Keeps every lifecycle event it sees and logs it.
#[derive(Debug, Default)]
pub struct AuditTrail {
    entries: Mutex<Vec<AuditEntry>>,
}

impl AuditTrail {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribes `trail` to all four lifecycle events.
    pub fn attach(trail: &Arc<Self>, publisher: &DomainEventPublisher) {
        publisher.register::<CommandExecutedEvent, _>(trail.clone());
        publisher.register::<CommandUndoneEvent, _>(trail.clone());
        publisher.register::<CommandRedoneEvent, _>(trail.clone());
        publisher.register::<CommandFailedEvent, _>(trail.clone());
    }

    /// Removes the subscriptions made by [`attach`](Self::attach).
    pub fn detach(trail: &Arc<Self>, publisher: &DomainEventPublisher) {
        publisher.unregister::<CommandExecutedEvent, _>(trail);
        publisher.unregister::<CommandUndoneEvent, _>(trail);
        publisher.unregister::<CommandRedoneEvent, _>(trail);
        publisher.unregister::<CommandFailedEvent, _>(trail);
    }

    /// Returns a copy of the entries in arrival order.
    pub fn entries(&self) -> Vec<AuditEntry> {
        self.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn append<E>(&self, event: &E, description: &str) -> Result<(), HandlerError>
    where
        E: DomainEvent + Serialize,
    {
        let detail = serde_json::to_value(event)
            .map_err(|err| HandlerError::new(format!("cannot serialize event: {err}")))?;

        tracing::info!(
            event_type = event.event_type(),
            event_id = %event.event_id(),
            command = description,
            "audit"
        );

        self.lock().push(AuditEntry {
            event_id: event.event_id(),
            occurred_on: event.occurred_on(),
            event_type: event.event_type(),
            description: description.to_string(),
            detail,
        });
        Ok(())
    }

    fn lock(&self) -> MutexGuard<'_, Vec<AuditEntry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl DomainEventHandler<CommandExecutedEvent> for AuditTrail {
    fn handle(&self, event: &CommandExecutedEvent) -> Result<(), HandlerError> {
        self.append(event, &event.description)
    }

    fn name(&self) -> &str {
        "audit-trail"
    }
}

impl DomainEventHandler<CommandUndoneEvent> for AuditTrail {
    fn handle(&self, event: &CommandUndoneEvent) -> Result<(), HandlerError> {
        self.append(event, &event.description)
    }

    fn name(&self) -> &str {
        "audit-trail"
    }
}

impl DomainEventHandler<CommandRedoneEvent> for AuditTrail {
    fn handle(&self, event: &CommandRedoneEvent) -> Result<(), HandlerError> {
        self.append(event, &event.description)
    }

    fn name(&self) -> &str {
        "audit-trail"
    }
}

impl DomainEventHandler<CommandFailedEvent> for AuditTrail {
    fn handle(&self, event: &CommandFailedEvent) -> Result<(), HandlerError> {
        self.append(event, &event.description)
    }

    fn name(&self) -> &str {
        "audit-trail"
    }
}
