//! Bounded worker pool for asynchronous delivery.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::runtime::Handle;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;

/// A unit of delivery work.
pub(crate) type Job = Box<dyn FnOnce() + Send + 'static>;

/// Why a job was handed back instead of queued.
pub(crate) enum Rejected {
    /// The queue is at capacity.
    Full(Job),
    /// The pool has been closed.
    Closed(Job),
}

/// A fixed set of tokio tasks draining one bounded queue.
///
/// Each job runs on the blocking thread pool so handlers may block without
/// stalling the async executor.
pub(crate) struct WorkerPool {
    sender: Mutex<Option<mpsc::Sender<Job>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl WorkerPool {
    pub(crate) fn start(handle: &Handle, workers: usize, capacity: usize) -> Self {
        let (sender, receiver) = mpsc::channel::<Job>(capacity.max(1));
        let receiver = Arc::new(tokio::sync::Mutex::new(receiver));

        let workers = (0..workers.max(1))
            .map(|id| handle.spawn(run_worker(id, receiver.clone())))
            .collect();

        Self {
            sender: Mutex::new(Some(sender)),
            workers: Mutex::new(workers),
        }
    }

    /// Queues `job` without waiting for space.
    pub(crate) fn submit(&self, job: Job) -> Result<(), Rejected> {
        let guard = lock(&self.sender);
        let Some(sender) = guard.as_ref() else {
            return Err(Rejected::Closed(job));
        };

        sender.try_send(job).map_err(|err| match err {
            TrySendError::Full(job) => Rejected::Full(job),
            TrySendError::Closed(job) => Rejected::Closed(job),
        })
    }

    /// Queues `job`, waiting for space if the queue is full.
    ///
    /// Hands the job back if the pool is closed.
    pub(crate) async fn submit_wait(&self, job: Job) -> Result<(), Job> {
        let sender = lock(&self.sender).clone();
        let Some(sender) = sender else {
            return Err(job);
        };
        sender.send(job).await.map_err(|err| err.0)
    }

    /// Stops accepting jobs. Queued jobs are still run.
    pub(crate) fn close(&self) {
        lock(&self.sender).take();
    }

    /// Waits for every worker to exit. Only returns once the pool is closed.
    pub(crate) async fn join(&self) {
        let workers: Vec<_> = lock(&self.workers).drain(..).collect();
        for worker in workers {
            if let Err(err) = worker.await {
                tracing::error!(error = %err, "event worker terminated abnormally");
            }
        }
    }
}

async fn run_worker(id: usize, receiver: Arc<tokio::sync::Mutex<mpsc::Receiver<Job>>>) {
    tracing::debug!(worker = id, "event worker started");

    loop {
        let job = {
            let mut receiver = receiver.lock().await;
            receiver.recv().await
        };
        let Some(job) = job else {
            break;
        };

        if let Err(err) = tokio::task::spawn_blocking(job).await {
            tracing::error!(worker = id, error = %err, "event job did not complete");
        }
    }

    tracing::debug!(worker = id, "event worker stopped");
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
