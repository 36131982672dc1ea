//! History configuration.

use serde::{Deserialize, Serialize};

/// How lifecycle events are handed to the publisher.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DispatchMode {
    /// Handlers run before the history operation returns.
    #[default]
    Sync,
    /// Handlers run on the publisher's ordered lane, one event at a time and
    /// in operation order. Operations only wait for queue space.
    Async,
}

impl DispatchMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            DispatchMode::Sync => "sync",
            DispatchMode::Async => "async",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HistoryConfig {
    /// Undo entries kept; the oldest are dropped beyond this. `None` or
    /// `Some(0)` keeps all.
    pub max_depth: Option<usize>,
    pub dispatch: DispatchMode,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            max_depth: Some(100),
            dispatch: DispatchMode::Sync,
        }
    }
}

impl HistoryConfig {
    /// A history that never forgets and dispatches synchronously.
    pub fn unbounded() -> Self {
        Self {
            max_depth: None,
            dispatch: DispatchMode::Sync,
        }
    }

    /// Caps the undo stack at `max_depth` entries. `0` means unbounded.
    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = (max_depth > 0).then_some(max_depth);
        self
    }

    pub fn with_dispatch(mut self, dispatch: DispatchMode) -> Self {
        self.dispatch = dispatch;
        self
    }
}
