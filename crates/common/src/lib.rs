//! Shared identifier types used across the command and event crates.

pub mod types;

pub use types::{EventId, SequenceNumber};
