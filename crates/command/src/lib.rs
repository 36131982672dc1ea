//! Undoable, composable asynchronous commands.
//!
//! This crate provides:
//! - [`Command`] trait for reversible units of work
//! - [`AnyCommand`] / [`BoxedCommand`] for holding commands with different outputs side by side
//! - [`CompositeCommand`] for running an ordered list of commands as one logical operation,
//!   with reverse-order rollback when a step fails
//! - [`AssignCommand`] for field edits and [`ScriptedCommand`] for rehearsing flows in tests

pub mod assign;
pub mod command;
pub mod composite;
pub mod error;
pub mod scripted;

pub use assign::AssignCommand;
pub use command::{AnyCommand, BoxedCommand, Command, boxed, boxed_arc, downcast_output};
pub use composite::{CompositeCommand, ExecutionAttempt};
pub use error::{CommandError, Result};
pub use scripted::{Journal, ScriptedCommand};
