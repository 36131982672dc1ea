//! Undo/redo command history.
//!
//! [`CommandHistory`] executes commands, keeps the successful ones for undo
//! and redo, and announces each outcome as a lifecycle event on a
//! [`DomainEventPublisher`](events::DomainEventPublisher).

pub mod config;
pub mod error;
pub mod history;
pub mod lifecycle;
mod record;

pub use config::{DispatchMode, HistoryConfig};
pub use error::{HistoryError, Result};
pub use history::CommandHistory;
pub use lifecycle::{
    CommandExecutedEvent, CommandFailedEvent, CommandOperation, CommandRedoneEvent,
    CommandUndoneEvent,
};
pub use record::CommandSummary;
