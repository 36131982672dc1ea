//! Integration tests for the event publisher.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex, Weak};
use std::thread::{self, ThreadId};
use std::time::Duration;

use chrono::{DateTime, Utc};
use common::EventId;
use events::{
    DomainEvent, DomainEventHandler, DomainEventPublisher, EventMetadata, HandlerError,
    OverflowPolicy, PublisherConfig, PublisherError, PublisherState, global, handler_fn,
};
use metrics_exporter_prometheus::PrometheusBuilder;
use serial_test::serial;

#[derive(Debug, Clone)]
struct DocumentSaved {
    meta: EventMetadata,
    title: String,
}

impl DocumentSaved {
    fn new(title: &str) -> Self {
        Self {
            meta: EventMetadata::new(),
            title: title.to_string(),
        }
    }
}

impl DomainEvent for DocumentSaved {
    fn event_id(&self) -> EventId {
        self.meta.event_id
    }

    fn occurred_on(&self) -> DateTime<Utc> {
        self.meta.occurred_on
    }

    fn event_type(&self) -> &'static str {
        "DocumentSaved"
    }
}

#[derive(Debug)]
struct DocumentClosed {
    meta: EventMetadata,
}

impl DomainEvent for DocumentClosed {
    fn event_id(&self) -> EventId {
        self.meta.event_id
    }

    fn occurred_on(&self) -> DateTime<Utc> {
        self.meta.occurred_on
    }

    fn event_type(&self) -> &'static str {
        "DocumentClosed"
    }
}

/// Records every event it receives together with the delivering thread.
#[derive(Default)]
struct Recorder {
    seen: Mutex<Vec<(EventId, String, ThreadId)>>,
}

impl Recorder {
    fn count(&self) -> usize {
        self.seen.lock().unwrap().len()
    }

    fn ids(&self) -> Vec<EventId> {
        self.seen.lock().unwrap().iter().map(|(id, _, _)| *id).collect()
    }

    fn titles(&self) -> Vec<String> {
        self.seen.lock().unwrap().iter().map(|(_, t, _)| t.clone()).collect()
    }

    fn threads(&self) -> Vec<ThreadId> {
        self.seen.lock().unwrap().iter().map(|(_, _, t)| *t).collect()
    }
}

impl DomainEventHandler<DocumentSaved> for Recorder {
    fn handle(&self, event: &DocumentSaved) -> Result<(), HandlerError> {
        self.seen
            .lock()
            .unwrap()
            .push((event.event_id(), event.title.clone(), thread::current().id()));
        Ok(())
    }
}

/// Blocks handlers until opened.
#[derive(Default)]
struct Gate {
    open: Mutex<bool>,
    changed: Condvar,
}

impl Gate {
    fn wait(&self) {
        let mut open = self.open.lock().unwrap();
        while !*open {
            open = self.changed.wait(open).unwrap();
        }
    }

    fn open(&self) {
        *self.open.lock().unwrap() = true;
        self.changed.notify_all();
    }
}

async fn wait_until(mut condition: impl FnMut() -> bool) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition not met within timeout");
}

fn pooled(workers: usize, queue_capacity: usize, overflow: OverflowPolicy) -> DomainEventPublisher {
    DomainEventPublisher::new(PublisherConfig {
        workers,
        queue_capacity,
        overflow,
    })
}

#[test]
fn test_register_publish_unregister() {
    let publisher = DomainEventPublisher::new(PublisherConfig::default());
    let recorder = Arc::new(Recorder::default());
    publisher.register::<DocumentSaved, _>(recorder.clone());

    let event = DocumentSaved::new("draft");
    let outcome = publisher.publish(&event);

    assert_eq!(outcome.handlers, 1);
    assert_eq!(outcome.delivered(), 1);
    assert_eq!(recorder.ids(), vec![event.event_id()]);

    assert!(publisher.unregister::<DocumentSaved, _>(&recorder));
    publisher.publish(&DocumentSaved::new("final"));
    assert_eq!(recorder.count(), 1);
}

#[test]
fn test_unregister_unknown_handler_is_noop() {
    let publisher = DomainEventPublisher::new(PublisherConfig::default());
    let stranger = Arc::new(Recorder::default());

    assert!(!publisher.unregister::<DocumentSaved, _>(&stranger));

    let registered = Arc::new(Recorder::default());
    publisher.register::<DocumentSaved, _>(registered.clone());
    assert!(!publisher.unregister::<DocumentSaved, _>(&stranger));
    assert_eq!(publisher.handler_count::<DocumentSaved>(), 1);
}

#[test]
fn test_handlers_are_routed_by_event_type() {
    let publisher = DomainEventPublisher::new(PublisherConfig::default());
    let saves = Arc::new(Recorder::default());
    let closes = Arc::new(AtomicUsize::new(0));

    publisher.register::<DocumentSaved, _>(saves.clone());
    let counter = closes.clone();
    publisher.register::<DocumentClosed, _>(Arc::new(handler_fn(
        "closes",
        move |_: &DocumentClosed| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        },
    )));

    publisher.publish(&DocumentClosed {
        meta: EventMetadata::new(),
    });

    assert_eq!(saves.count(), 0);
    assert_eq!(closes.load(Ordering::SeqCst), 1);
}

#[test]
fn test_failing_handler_does_not_stop_siblings() {
    let publisher = DomainEventPublisher::new(PublisherConfig::default());
    let recorder = Arc::new(Recorder::default());

    publisher.register::<DocumentSaved, _>(Arc::new(handler_fn(
        "rejects",
        |_: &DocumentSaved| Err(HandlerError::new("listener unavailable")),
    )));
    publisher.register::<DocumentSaved, _>(recorder.clone());

    let outcome = publisher.publish(&DocumentSaved::new("draft"));

    assert_eq!(outcome.failures, 1);
    assert_eq!(recorder.count(), 1);
}

#[test]
fn test_panicking_handler_does_not_stop_siblings() {
    let publisher = DomainEventPublisher::new(PublisherConfig::default());
    let recorder = Arc::new(Recorder::default());

    publisher.register::<DocumentSaved, _>(Arc::new(handler_fn(
        "panics",
        |_: &DocumentSaved| -> Result<(), HandlerError> { panic!("handler bug") },
    )));
    publisher.register::<DocumentSaved, _>(recorder.clone());

    let outcome = publisher.publish(&DocumentSaved::new("draft"));

    assert_eq!(outcome.failures, 1);
    assert_eq!(recorder.count(), 1);

    // The publisher is still usable afterwards.
    publisher.publish(&DocumentSaved::new("again"));
    assert_eq!(recorder.count(), 2);
}

#[test]
fn test_handlers_invoked_in_registration_order() {
    let publisher = DomainEventPublisher::new(PublisherConfig::default());
    let order = Arc::new(Mutex::new(Vec::new()));

    for name in ["first", "second", "third"] {
        let order = order.clone();
        publisher.register::<DocumentSaved, _>(Arc::new(handler_fn(
            name,
            move |_: &DocumentSaved| {
                order.lock().unwrap().push(name);
                Ok(())
            },
        )));
    }

    publisher.publish(&DocumentSaved::new("draft"));
    assert_eq!(*order.lock().unwrap(), vec!["first", "second", "third"]);
}

struct Unsubscriber {
    publisher: Weak<DomainEventPublisher>,
    target: Arc<Recorder>,
}

impl DomainEventHandler<DocumentSaved> for Unsubscriber {
    fn handle(&self, _: &DocumentSaved) -> Result<(), HandlerError> {
        if let Some(publisher) = self.publisher.upgrade() {
            publisher.unregister::<DocumentSaved, _>(&self.target);
        }
        Ok(())
    }
}

#[test]
fn test_unregister_during_dispatch_applies_to_next_publish() {
    let publisher = Arc::new(DomainEventPublisher::new(PublisherConfig::default()));
    let target = Arc::new(Recorder::default());

    publisher.register::<DocumentSaved, _>(Arc::new(Unsubscriber {
        publisher: Arc::downgrade(&publisher),
        target: target.clone(),
    }));
    publisher.register::<DocumentSaved, _>(target.clone());

    publisher.publish(&DocumentSaved::new("one"));
    publisher.publish(&DocumentSaved::new("two"));

    assert_eq!(target.count(), 1);
    assert_eq!(publisher.handler_count::<DocumentSaved>(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_publish_async_returns_before_delivery() {
    let publisher = pooled(2, 16, OverflowPolicy::CallerRuns);
    let gate = Arc::new(Gate::default());
    let recorder = Arc::new(Recorder::default());

    let blocker = gate.clone();
    publisher.register::<DocumentSaved, _>(Arc::new(handler_fn(
        "gated",
        move |_: &DocumentSaved| {
            blocker.wait();
            Ok(())
        },
    )));
    publisher.register::<DocumentSaved, _>(recorder.clone());

    publisher.publish_async(DocumentSaved::new("draft"));
    assert_eq!(recorder.count(), 0);

    gate.open();
    wait_until(|| recorder.count() == 1).await;

    publisher.shutdown();
    publisher.join().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_publish_async_reaches_every_handler() {
    let publisher = pooled(4, 64, OverflowPolicy::CallerRuns);
    let recorders: Vec<Arc<Recorder>> = (0..3).map(|_| Arc::new(Recorder::default())).collect();
    for recorder in &recorders {
        publisher.register::<DocumentSaved, _>(recorder.clone());
    }

    for n in 0..10 {
        publisher.publish_async(DocumentSaved::new(&format!("rev-{n}")));
    }

    wait_until(|| recorders.iter().all(|r| r.count() == 10)).await;

    let caller = thread::current().id();
    assert!(recorders[0].threads().iter().all(|t| *t != caller));

    publisher.shutdown();
    publisher.join().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_async_failure_isolation() {
    let publisher = pooled(1, 8, OverflowPolicy::CallerRuns);
    let recorder = Arc::new(Recorder::default());

    publisher.register::<DocumentSaved, _>(Arc::new(handler_fn(
        "panics",
        |_: &DocumentSaved| -> Result<(), HandlerError> { panic!("async handler bug") },
    )));
    publisher.register::<DocumentSaved, _>(recorder.clone());

    publisher.publish_async(DocumentSaved::new("one"));
    publisher.publish_async(DocumentSaved::new("two"));

    wait_until(|| recorder.count() == 2).await;

    publisher.shutdown();
    publisher.join().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_shutdown_drains_queue_then_falls_back_to_inline() {
    let publisher = pooled(1, 16, OverflowPolicy::CallerRuns);
    let recorder = Arc::new(Recorder::default());
    publisher.register::<DocumentSaved, _>(recorder.clone());

    for n in 0..5 {
        publisher.publish_async(DocumentSaved::new(&format!("queued-{n}")));
    }
    publisher.shutdown();
    publisher.join().await;

    assert_eq!(publisher.state(), PublisherState::Stopped);
    assert_eq!(recorder.count(), 5);

    publisher.publish_async(DocumentSaved::new("late"));
    assert_eq!(recorder.count(), 6);
    assert_eq!(publisher.publish(&DocumentSaved::new("sync")).delivered(), 1);
    assert_eq!(recorder.count(), 7);
}

/// Builds a one-worker publisher whose worker is parked on `gate` and whose
/// single queue slot is taken.
async fn saturated(
    overflow: OverflowPolicy,
    gate: &Arc<Gate>,
    recorder: &Arc<Recorder>,
) -> DomainEventPublisher {
    let publisher = pooled(1, 1, overflow);
    let started = Arc::new(AtomicUsize::new(0));

    let blocker = gate.clone();
    let first = started.clone();
    publisher.register::<DocumentSaved, _>(Arc::new(handler_fn(
        "gated",
        move |_: &DocumentSaved| {
            if first.fetch_add(1, Ordering::SeqCst) == 0 {
                blocker.wait();
            }
            Ok(())
        },
    )));
    publisher.register::<DocumentSaved, _>(recorder.clone());

    publisher.publish_async(DocumentSaved::new("running"));
    wait_until(|| started.load(Ordering::SeqCst) == 1).await;
    publisher.publish_async(DocumentSaved::new("queued"));

    publisher
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_full_queue_with_reject_drops_delivery() {
    let gate = Arc::new(Gate::default());
    let recorder = Arc::new(Recorder::default());
    let publisher = saturated(OverflowPolicy::Reject, &gate, &recorder).await;

    publisher.publish_async(DocumentSaved::new("overflow"));
    assert_eq!(recorder.count(), 0);

    gate.open();
    publisher.shutdown();
    publisher.join().await;

    assert_eq!(recorder.count(), 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_full_queue_with_caller_runs_delivers_on_caller() {
    let gate = Arc::new(Gate::default());
    let recorder = Arc::new(Recorder::default());
    let publisher = saturated(OverflowPolicy::CallerRuns, &gate, &recorder).await;

    publisher.publish_async(DocumentSaved::new("overflow"));
    assert_eq!(recorder.count(), 1);
    assert_eq!(recorder.threads()[0], thread::current().id());

    gate.open();
    publisher.shutdown();
    publisher.join().await;

    assert_eq!(recorder.count(), 3);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_sequenced_delivery_keeps_publishing_order() {
    let publisher = pooled(4, 16, OverflowPolicy::CallerRuns);
    let recorder = Arc::new(Recorder::default());

    publisher.register::<DocumentSaved, _>(Arc::new(handler_fn(
        "slow-first",
        |event: &DocumentSaved| {
            if event.title == "rev-0" {
                thread::sleep(Duration::from_millis(30));
            }
            Ok(())
        },
    )));
    publisher.register::<DocumentSaved, _>(recorder.clone());

    for n in 0..5 {
        publisher
            .publish_sequenced(DocumentSaved::new(&format!("rev-{n}")))
            .await;
    }

    wait_until(|| recorder.count() == 5).await;
    assert_eq!(
        recorder.titles(),
        vec!["rev-0", "rev-1", "rev-2", "rev-3", "rev-4"]
    );

    publisher.shutdown();
    publisher.join().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_sequenced_after_shutdown_delivers_inline() {
    let publisher = pooled(2, 4, OverflowPolicy::CallerRuns);
    let recorder = Arc::new(Recorder::default());
    publisher.register::<DocumentSaved, _>(recorder.clone());

    publisher.shutdown();
    publisher.join().await;

    publisher.publish_sequenced(DocumentSaved::new("late")).await;
    assert_eq!(recorder.titles(), vec!["late"]);
}

#[test]
fn test_rejections_and_handler_failures_are_counted() {
    let recorder = PrometheusBuilder::new().build_recorder();
    let handle = recorder.handle();

    metrics::with_local_recorder(&recorder, || {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .enable_all()
            .build()
            .unwrap();

        runtime.block_on(async {
            let gate = Arc::new(Gate::default());
            let seen = Arc::new(Recorder::default());
            let publisher = saturated(OverflowPolicy::Reject, &gate, &seen).await;

            publisher.publish_async(DocumentSaved::new("overflow"));

            publisher.register::<DocumentClosed, _>(Arc::new(handler_fn(
                "refuses",
                |_: &DocumentClosed| Err(HandlerError::new("closed twice")),
            )));
            publisher.publish(&DocumentClosed {
                meta: EventMetadata::new(),
            });

            gate.open();
            publisher.shutdown();
            publisher.join().await;
        });
    });

    let rendered = handle.render();
    assert!(
        rendered.contains(r#"events_async_rejected_total{event_type="DocumentSaved"} 1"#),
        "{rendered}"
    );
    assert!(
        rendered.contains(r#"event_handler_failures_total{event_type="DocumentClosed"} 1"#),
        "{rendered}"
    );
}

#[test]
fn test_concurrent_register_and_publish() {
    let publisher = Arc::new(DomainEventPublisher::new(PublisherConfig::default()));
    let recorders: Vec<Arc<Recorder>> = (0..8).map(|_| Arc::new(Recorder::default())).collect();

    thread::scope(|scope| {
        for recorder in &recorders {
            let publisher = publisher.clone();
            scope.spawn(move || {
                publisher.register::<DocumentSaved, _>(recorder.clone());
                for _ in 0..50 {
                    publisher.publish(&DocumentSaved::new("tick"));
                }
            });
        }
    });

    assert_eq!(publisher.handler_count::<DocumentSaved>(), 8);
    // Each recorder sees at least its own thread's publishes.
    assert!(recorders.iter().all(|r| r.count() >= 50));
}

#[test]
#[serial]
fn test_global_instance_is_lazily_created_and_shared() {
    global::reset();

    let a = global::instance();
    let b = global::instance();
    assert!(Arc::ptr_eq(&a, &b));

    global::reset();
}

#[test]
#[serial]
fn test_global_set_instance_replaces_and_returns_previous() {
    global::reset();

    let first = Arc::new(DomainEventPublisher::new(PublisherConfig::default()));
    let second = Arc::new(DomainEventPublisher::new(PublisherConfig::default()));

    assert!(global::set_instance(first.clone()).unwrap().is_none());
    let previous = global::set_instance(second.clone()).unwrap().unwrap();
    assert!(Arc::ptr_eq(&previous, &first));
    assert!(Arc::ptr_eq(&global::instance(), &second));

    let removed = global::reset().unwrap();
    assert!(Arc::ptr_eq(&removed, &second));
}

#[test]
#[serial]
fn test_global_rejects_stopped_publisher() {
    global::reset();

    let stopped = Arc::new(DomainEventPublisher::new(PublisherConfig::default()));
    stopped.shutdown();

    let err = global::set_instance(stopped).unwrap_err();
    assert!(matches!(err, PublisherError::InvalidArgument(_)));
    assert!(global::reset().is_none());
}

#[test]
#[serial]
fn test_global_shutdown_stops_installed_instance() {
    global::reset();

    let publisher = Arc::new(DomainEventPublisher::new(PublisherConfig::default()));
    global::set_instance(publisher.clone()).unwrap();

    global::shutdown();
    assert_eq!(publisher.state(), PublisherState::Stopped);

    global::reset();
}
