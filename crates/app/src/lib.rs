//! Composition root for the command engine.
//!
//! [`App::bootstrap`] wires one publisher, one history and the audit trail
//! together and installs the publisher as the process-wide instance.

pub mod audit;
pub mod config;
pub mod error;
pub mod telemetry;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use events::{DomainEventPublisher, global};
use history::CommandHistory;

pub use audit::{AuditEntry, AuditTrail};
pub use config::{Config, LogFormat};
pub use error::{AppError, Result};

/// The wired-up engine.
pub struct App {
    config: Config,
    publisher: Arc<DomainEventPublisher>,
    history: CommandHistory,
    audit: Arc<AuditTrail>,
    stopped: AtomicBool,
}

impl App {
    /// Builds the engine from `config`.
    ///
    /// Must be called inside a tokio runtime for asynchronous delivery to use
    /// the worker pool.
    pub fn bootstrap(config: &Config) -> Result<Self> {
        let publisher = Arc::new(DomainEventPublisher::new(config.publisher_config()));
        if global::set_instance(publisher.clone())?.is_some() {
            tracing::warn!("replaced a previously installed event publisher");
        }

        let audit = Arc::new(AuditTrail::new());
        AuditTrail::attach(&audit, &publisher);

        let history = CommandHistory::new(publisher.clone(), config.history_config());

        tracing::info!(
            workers = config.event_workers,
            queue_capacity = config.event_queue_capacity,
            overflow = %config.event_overflow,
            max_depth = ?config.history_max_depth,
            dispatch = config.history_dispatch.as_str(),
            "engine bootstrapped"
        );

        Ok(Self {
            config: config.clone(),
            publisher,
            history,
            audit,
            stopped: AtomicBool::new(false),
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn publisher(&self) -> &Arc<DomainEventPublisher> {
        &self.publisher
    }

    pub fn history(&self) -> &CommandHistory {
        &self.history
    }

    pub fn audit(&self) -> &Arc<AuditTrail> {
        &self.audit
    }

    /// Stops the publisher and waits for queued deliveries. Runs once.
    ///
    /// The process-wide slot is cleared if it still holds this publisher.
    pub async fn shutdown(&self) {
        if self.stopped.swap(true, Ordering::AcqRel) {
            return;
        }

        self.publisher.shutdown();
        self.publisher.join().await;

        if global::current().is_some_and(|installed| Arc::ptr_eq(&installed, &self.publisher)) {
            global::reset();
        }

        tracing::info!(audit_entries = self.audit.len(), "engine shut down");
    }
}
