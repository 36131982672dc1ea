//! Typed domain events and an in-process publish/subscribe bus.
//!
//! This crate provides:
//! - [`DomainEvent`] and [`DomainEventHandler`] contracts
//! - [`DomainEventPublisher`] with synchronous delivery and bounded asynchronous delivery
//! - [`global`] access to a process-wide publisher for composition roots and tests

pub mod error;
pub mod event;
pub mod global;
pub mod handler;
mod pool;
pub mod publisher;
mod registry;

pub use error::{HandlerError, PublisherError, Result};
pub use event::{DomainEvent, EventMetadata};
pub use handler::{DomainEventHandler, FnHandler, handler_fn};
pub use publisher::{DomainEventPublisher, OverflowPolicy, PublisherConfig, PublisherState};
pub use registry::DispatchOutcome;
