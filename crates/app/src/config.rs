//! Application configuration loaded from environment variables.

use std::str::FromStr;

use events::{OverflowPolicy, PublisherConfig};
use history::{DispatchMode, HistoryConfig};

/// Output format of the log subscriber.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "text" | "pretty" => Ok(LogFormat::Text),
            "json" => Ok(LogFormat::Json),
            other => Err(format!("unknown log format '{other}'")),
        }
    }
}

/// Engine configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `RUST_LOG`: tracing filter directive (default: `"info"`)
/// - `LOG_FORMAT`: `text` or `json` (default: `text`)
/// - `EVENT_WORKERS`: asynchronous delivery workers (default: `4`)
/// - `EVENT_QUEUE_CAPACITY`: queued asynchronous deliveries (default: `1024`)
/// - `EVENT_OVERFLOW`: `caller-runs` or `reject` (default: `caller-runs`)
/// - `HISTORY_MAX_DEPTH`: undo entries kept, `0` for unlimited (default: `100`)
/// - `HISTORY_DISPATCH`: `sync` or `async` lifecycle events (default: `sync`)
///
/// Unparseable values fall back to the default.
#[derive(Debug, Clone)]
pub struct Config {
    pub log_level: String,
    pub log_format: LogFormat,
    pub event_workers: usize,
    pub event_queue_capacity: usize,
    pub event_overflow: OverflowPolicy,
    pub history_max_depth: Option<usize>,
    pub history_dispatch: DispatchMode,
}

impl Config {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Loads configuration from an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();

        Self {
            log_level: lookup("RUST_LOG").unwrap_or(defaults.log_level),
            log_format: parse_or(lookup("LOG_FORMAT"), defaults.log_format),
            event_workers: lookup("EVENT_WORKERS")
                .and_then(|v| v.parse().ok())
                .filter(|&n: &usize| n > 0)
                .unwrap_or(defaults.event_workers),
            event_queue_capacity: lookup("EVENT_QUEUE_CAPACITY")
                .and_then(|v| v.parse().ok())
                .filter(|&n: &usize| n > 0)
                .unwrap_or(defaults.event_queue_capacity),
            event_overflow: lookup("EVENT_OVERFLOW")
                .and_then(|v| parse_overflow(&v))
                .unwrap_or(defaults.event_overflow),
            history_max_depth: match lookup("HISTORY_MAX_DEPTH").and_then(|v| v.parse().ok()) {
                Some(0) => None,
                Some(depth) => Some(depth),
                None => defaults.history_max_depth,
            },
            history_dispatch: lookup("HISTORY_DISPATCH")
                .and_then(|v| parse_dispatch(&v))
                .unwrap_or(defaults.history_dispatch),
        }
    }

    /// Returns the publisher settings.
    pub fn publisher_config(&self) -> PublisherConfig {
        PublisherConfig {
            workers: self.event_workers,
            queue_capacity: self.event_queue_capacity,
            overflow: self.event_overflow,
        }
    }

    /// Returns the history settings.
    pub fn history_config(&self) -> HistoryConfig {
        HistoryConfig {
            max_depth: self.history_max_depth,
            dispatch: self.history_dispatch,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        let publisher = PublisherConfig::default();
        let history = HistoryConfig::default();
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Text,
            event_workers: publisher.workers,
            event_queue_capacity: publisher.queue_capacity,
            event_overflow: publisher.overflow,
            history_max_depth: history.max_depth,
            history_dispatch: history.dispatch,
        }
    }
}

fn parse_or<T: FromStr>(value: Option<String>, default: T) -> T {
    value.and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn parse_overflow(value: &str) -> Option<OverflowPolicy> {
    match value.trim().to_ascii_lowercase().as_str() {
        "caller-runs" | "caller_runs" => Some(OverflowPolicy::CallerRuns),
        "reject" => Some(OverflowPolicy::Reject),
        _ => None,
    }
}

fn parse_dispatch(value: &str) -> Option<DispatchMode> {
    match value.trim().to_ascii_lowercase().as_str() {
        "sync" => Some(DispatchMode::Sync),
        "async" => Some(DispatchMode::Async),
        _ => None,
    }
}
