//! The domain event publisher.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use serde::{Deserialize, Serialize};
use tokio::runtime::Handle;

use crate::event::DomainEvent;
use crate::handler::DomainEventHandler;
use crate::pool::{Rejected, WorkerPool};
use crate::registry::{DispatchOutcome, HandlerRegistry, deliver};

/// What `publish_async` does when the worker queue is full.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OverflowPolicy {
    /// Deliver synchronously on the publishing thread.
    #[default]
    CallerRuns,
    /// Drop the delivery and log a warning.
    Reject,
}

impl OverflowPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            OverflowPolicy::CallerRuns => "caller-runs",
            OverflowPolicy::Reject => "reject",
        }
    }
}

impl fmt::Display for OverflowPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Sizing of the asynchronous delivery pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PublisherConfig {
    /// Number of worker tasks.
    pub workers: usize,
    /// Deliveries that may wait in the queue.
    pub queue_capacity: usize,
    pub overflow: OverflowPolicy,
}

impl Default for PublisherConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            queue_capacity: 1024,
            overflow: OverflowPolicy::CallerRuns,
        }
    }
}

/// Lifecycle of a publisher. `Stopped` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PublisherState {
    Active,
    Stopped,
}

impl PublisherState {
    pub fn as_str(&self) -> &'static str {
        match self {
            PublisherState::Active => "active",
            PublisherState::Stopped => "stopped",
        }
    }
}

impl fmt::Display for PublisherState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Routes typed events to the handlers registered for their type.
///
/// Registration, unregistration and publishing are safe from any thread.
/// Synchronous delivery runs on the caller's thread in registration order;
/// asynchronous delivery is queued on a bounded worker pool. Sequenced
/// delivery goes through a single-worker lane, so handlers see those events
/// in publishing order. A failing or
/// panicking handler never affects its siblings or the publisher.
///
/// After [`shutdown`](Self::shutdown) the publisher keeps delivering, but
/// only synchronously.
pub struct DomainEventPublisher {
    registry: HandlerRegistry,
    pool: Option<WorkerPool>,
    lane: Option<WorkerPool>,
    overflow: OverflowPolicy,
    stopped: AtomicBool,
}

impl fmt::Debug for DomainEventPublisher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DomainEventPublisher")
            .field("state", &self.state())
            .field("pooled", &self.pool.is_some())
            .field("overflow", &self.overflow)
            .finish()
    }
}

impl DomainEventPublisher {
    /// Creates a publisher whose workers run on the current tokio runtime.
    ///
    /// Outside a runtime there is no pool and `publish_async` delivers
    /// synchronously.
    pub fn new(config: PublisherConfig) -> Self {
        match Handle::try_current() {
            Ok(handle) => Self::with_handle(config, &handle),
            Err(_) => {
                tracing::debug!("no tokio runtime, asynchronous delivery will run inline");
                Self::build(config, None, None)
            }
        }
    }

    /// Creates a publisher whose workers run on `handle`.
    pub fn with_handle(config: PublisherConfig, handle: &Handle) -> Self {
        let pool = WorkerPool::start(handle, config.workers, config.queue_capacity);
        let lane = WorkerPool::start(handle, 1, config.queue_capacity);
        tracing::debug!(
            workers = config.workers,
            queue_capacity = config.queue_capacity,
            overflow = %config.overflow,
            "event publisher started"
        );
        Self::build(config, Some(pool), Some(lane))
    }

    fn build(config: PublisherConfig, pool: Option<WorkerPool>, lane: Option<WorkerPool>) -> Self {
        Self {
            registry: HandlerRegistry::default(),
            pool,
            lane,
            overflow: config.overflow,
            stopped: AtomicBool::new(false),
        }
    }

    /// Adds `handler` for events of type `E`.
    ///
    /// The same instance may be registered more than once; it is then
    /// invoked once per registration.
    pub fn register<E, H>(&self, handler: Arc<H>)
    where
        E: DomainEvent,
        H: DomainEventHandler<E> + ?Sized + 'static,
    {
        tracing::debug!(
            event_type = std::any::type_name::<E>(),
            handler = handler.name(),
            "handler registered"
        );
        self.registry.register::<E, H>(handler);
    }

    /// Removes one registration of this exact handler instance.
    ///
    /// Returns false if it was not registered for `E`.
    pub fn unregister<E, H>(&self, handler: &Arc<H>) -> bool
    where
        E: DomainEvent,
        H: ?Sized,
    {
        let removed = self.registry.unregister::<E, H>(handler);
        tracing::debug!(
            event_type = std::any::type_name::<E>(),
            removed,
            "handler unregistration"
        );
        removed
    }

    /// Returns how many handlers are registered for `E`.
    pub fn handler_count<E: DomainEvent>(&self) -> usize {
        self.registry.count::<E>()
    }

    /// Returns whether the publisher still accepts asynchronous work.
    ///
    /// ```
    /// use events::{DomainEventPublisher, PublisherConfig, PublisherState};
    ///
    /// let publisher = DomainEventPublisher::new(PublisherConfig::default());
    /// assert_eq!(publisher.state(), PublisherState::Active);
    /// publisher.shutdown();
    /// assert_eq!(publisher.state(), PublisherState::Stopped);
    /// ```
    pub fn state(&self) -> PublisherState {
        if self.stopped.load(Ordering::Acquire) {
            PublisherState::Stopped
        } else {
            PublisherState::Active
        }
    }

    /// Delivers `event` to every handler of its type before returning.
    pub fn publish<E: DomainEvent>(&self, event: &E) -> DispatchOutcome {
        let Some(handlers) = self.registry.snapshot::<E>() else {
            tracing::trace!(event_type = event.event_type(), "no handlers registered");
            return DispatchOutcome::default();
        };

        metrics::counter!(
            "events_published_total",
            "event_type" => event.event_type(),
            "mode" => "sync"
        )
        .increment(1);
        deliver(event, &handlers)
    }

    /// Queues delivery of `event` and returns without waiting for it.
    ///
    /// Handlers are resolved now; registrations made afterwards do not see
    /// this event. When no pool is available, the publisher is stopped, or
    /// the queue is full under [`OverflowPolicy::CallerRuns`], delivery
    /// happens on the calling thread instead.
    pub fn publish_async<E: DomainEvent>(&self, event: E) {
        let event_type = event.event_type();
        let Some(handlers) = self.registry.snapshot::<E>() else {
            tracing::trace!(event_type, "no handlers registered");
            return;
        };

        let pool = match &self.pool {
            Some(pool) if self.state() == PublisherState::Active => pool,
            _ => {
                tracing::debug!(event_type, "asynchronous delivery unavailable, delivering inline");
                metrics::counter!("events_published_total", "event_type" => event_type, "mode" => "inline")
                    .increment(1);
                deliver(&event, &handlers);
                return;
            }
        };

        let job = Box::new(move || {
            deliver(&event, &handlers);
        });

        match pool.submit(job) {
            Ok(()) => {
                metrics::counter!("events_published_total", "event_type" => event_type, "mode" => "async")
                    .increment(1);
            }
            Err(Rejected::Full(job)) => match self.overflow {
                OverflowPolicy::CallerRuns => {
                    tracing::debug!(event_type, "event queue full, delivering on caller");
                    metrics::counter!("events_published_total", "event_type" => event_type, "mode" => "inline")
                        .increment(1);
                    job();
                }
                OverflowPolicy::Reject => {
                    tracing::warn!(event_type, "event queue full, delivery rejected");
                    metrics::counter!("events_async_rejected_total", "event_type" => event_type)
                        .increment(1);
                }
            },
            Err(Rejected::Closed(job)) => {
                tracing::debug!(event_type, "event queue closed, delivering inline");
                job();
            }
        }
    }

    /// Queues `event` on the ordered lane, waiting for space if it is full.
    ///
    /// Events published this way reach their handlers one at a time, in the
    /// order the calls were made. Without a lane, or once stopped, delivery
    /// happens on the calling thread before this returns.
    pub async fn publish_sequenced<E: DomainEvent>(&self, event: E) {
        let event_type = event.event_type();
        let Some(handlers) = self.registry.snapshot::<E>() else {
            tracing::trace!(event_type, "no handlers registered");
            return;
        };

        let lane = match &self.lane {
            Some(lane) if self.state() == PublisherState::Active => lane,
            _ => {
                tracing::debug!(event_type, "sequenced delivery unavailable, delivering inline");
                metrics::counter!("events_published_total", "event_type" => event_type, "mode" => "inline")
                    .increment(1);
                deliver(&event, &handlers);
                return;
            }
        };

        let job = Box::new(move || {
            deliver(&event, &handlers);
        });

        match lane.submit_wait(job).await {
            Ok(()) => {
                metrics::counter!("events_published_total", "event_type" => event_type, "mode" => "sequenced")
                    .increment(1);
            }
            Err(job) => {
                tracing::debug!(event_type, "event lane closed, delivering inline");
                job();
            }
        }
    }

    /// Stops accepting asynchronous work. Already queued deliveries still run.
    ///
    /// Calling it again has no effect.
    pub fn shutdown(&self) {
        if self.stopped.swap(true, Ordering::AcqRel) {
            return;
        }
        for pool in self.pool.iter().chain(&self.lane) {
            pool.close();
        }
        tracing::info!("event publisher stopped");
    }

    /// Waits until the workers have drained their queues and exited.
    ///
    /// Only meaningful after [`shutdown`](Self::shutdown): while the publisher
    /// is active, or has no pool, this returns immediately.
    pub async fn join(&self) {
        if self.state() == PublisherState::Active {
            tracing::debug!("join called on an active publisher, nothing to wait for");
            return;
        }
        for pool in self.pool.iter().chain(&self.lane) {
            pool.join().await;
        }
    }
}
