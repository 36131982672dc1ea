//! The domain event contract.

use std::any::Any;
use std::fmt::Debug;

use chrono::{DateTime, Utc};
use common::EventId;
use serde::{Deserialize, Serialize};

/// An immutable fact that something happened.
///
/// Handlers are routed by the concrete Rust type of the event; `event_type`
/// is only a label for logs and metrics.
pub trait DomainEvent: Any + Send + Sync + Debug {
    /// Returns the unique identifier of this occurrence.
    fn event_id(&self) -> EventId;

    /// Returns when the event occurred.
    fn occurred_on(&self) -> DateTime<Utc>;

    /// Returns the event type name.
    fn event_type(&self) -> &'static str;
}

/// Identity and timestamp shared by every concrete event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventMetadata {
    pub event_id: EventId,
    pub occurred_on: DateTime<Utc>,
}

impl EventMetadata {
    /// Stamps a fresh id and the current time.
    pub fn new() -> Self {
        Self {
            event_id: EventId::new(),
            occurred_on: Utc::now(),
        }
    }
}

impl Default for EventMetadata {
    fn default() -> Self {
        Self::new()
    }
}
