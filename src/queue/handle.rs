//! Public handles for submitting work to a throttled queue

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tracing::debug;

use super::clock::{Clock, TokioClock};
use super::config::QueueConfig;
use super::core::Dispatcher;
use super::messages::{QueueError, QueueRequest, QueueStats};
use super::unit::{Deferred, DoneSignal, WorkItem};

/// Channel to the queue worker, shared by both calling conventions
#[derive(Clone)]
struct QueueHandle {
    tx: mpsc::UnboundedSender<QueueRequest>,
    depth: Arc<AtomicUsize>,
    next_seq: Arc<AtomicU64>,
    interval: Duration,
    await_completion: bool,
}

impl QueueHandle {
    /// Spawn the worker task and return a handle to it
    ///
    /// Must be called from within a tokio runtime.
    fn spawn(interval: Duration, await_completion: bool, clock: Arc<dyn Clock>) -> Self {
        debug!(?interval, await_completion, "QueueHandle::spawn: called");
        let (tx, rx) = mpsc::unbounded_channel();
        let depth = Arc::new(AtomicUsize::new(0));

        let dispatcher = Dispatcher::new(interval, await_completion, clock, depth.clone());
        tokio::spawn(dispatcher.run(rx));

        Self {
            tx,
            depth,
            next_seq: Arc::new(AtomicU64::new(1)),
            interval,
            await_completion,
        }
    }

    fn next_seq(&self) -> u64 {
        self.next_seq.fetch_add(1, Ordering::Relaxed)
    }

    fn enqueue(&self, item: WorkItem) -> Result<(), QueueError> {
        // Count before sending so size() never lags a returned submit
        self.depth.fetch_add(1, Ordering::SeqCst);
        if self.tx.send(QueueRequest::Submit(item)).is_err() {
            self.depth.fetch_sub(1, Ordering::SeqCst);
            return Err(QueueError::Closed);
        }
        Ok(())
    }

    fn size(&self) -> usize {
        self.depth.load(Ordering::SeqCst)
    }

    async fn stats(&self) -> Result<QueueStats, QueueError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(QueueRequest::GetStats { reply_tx })
            .map_err(|_| QueueError::Closed)?;
        reply_rx.await.map_err(|_| QueueError::Closed)
    }
}

/// Throttled queue for signal-style actions
///
/// Each action receives a [`DoneSignal`]. With `await_completion` set, the
/// next dispatch is paced from the moment the action calls
/// [`DoneSignal::done`]; otherwise the signal is inert and pacing is measured
/// between dispatch starts.
///
/// Cloning the queue yields another handle to the same worker.
#[derive(Clone)]
pub struct CallbackQueue {
    inner: QueueHandle,
}

impl CallbackQueue {
    /// Create a queue and spawn its worker on the current tokio runtime
    pub fn new(interval: Duration, await_completion: bool) -> Self {
        Self::with_clock(interval, await_completion, Arc::new(TokioClock))
    }

    /// Create a queue from configuration
    pub fn from_config(config: &QueueConfig) -> Self {
        Self::new(config.interval(), config.await_completion)
    }

    /// Create a queue that reads "now" from a custom clock
    pub fn with_clock(interval: Duration, await_completion: bool, clock: Arc<dyn Clock>) -> Self {
        debug!(?interval, await_completion, "CallbackQueue::with_clock: called");
        Self {
            inner: QueueHandle::spawn(interval, await_completion, clock),
        }
    }

    /// Submit an action to run as soon as the pacing rule allows
    pub fn submit<F>(&self, action: F) -> Result<(), QueueError>
    where
        F: FnOnce(DoneSignal) + Send + 'static,
    {
        let seq = self.inner.next_seq();
        debug!(seq, "CallbackQueue::submit: called");
        self.inner
            .enqueue(WorkItem::signal(seq, action, self.inner.await_completion))
    }

    /// Number of submitted actions not yet dispatched
    pub fn size(&self) -> usize {
        self.inner.size()
    }

    /// Configured minimum interval between dispatches
    pub fn interval(&self) -> Duration {
        self.inner.interval
    }

    /// Whether pacing is measured from completion rather than start
    pub fn await_completion(&self) -> bool {
        self.inner.await_completion
    }

    /// Get a statistics snapshot from the worker
    pub async fn stats(&self) -> Result<QueueStats, QueueError> {
        debug!("CallbackQueue::stats: called");
        self.inner.stats().await
    }
}

/// Throttled queue for actions that return futures
///
/// Every submission immediately returns a [`Deferred`] that settles with the
/// action's own result. With `await_completion` set, the next dispatch is
/// paced from the moment the action's future settles.
///
/// Cloning the queue yields another handle to the same worker.
#[derive(Clone)]
pub struct DeferredQueue {
    inner: QueueHandle,
}

impl DeferredQueue {
    /// Create a queue and spawn its worker on the current tokio runtime
    pub fn new(interval: Duration, await_completion: bool) -> Self {
        Self::with_clock(interval, await_completion, Arc::new(TokioClock))
    }

    /// Create a queue from configuration
    pub fn from_config(config: &QueueConfig) -> Self {
        Self::new(config.interval(), config.await_completion)
    }

    /// Create a queue that reads "now" from a custom clock
    pub fn with_clock(interval: Duration, await_completion: bool, clock: Arc<dyn Clock>) -> Self {
        debug!(?interval, await_completion, "DeferredQueue::with_clock: called");
        Self {
            inner: QueueHandle::spawn(interval, await_completion, clock),
        }
    }

    /// Submit an action; the returned [`Deferred`] settles with its result
    pub fn submit<F, Fut, T, E>(&self, action: F) -> Result<Deferred<T, E>, QueueError>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        T: Send + 'static,
        E: Send + 'static,
    {
        let seq = self.inner.next_seq();
        debug!(seq, "DeferredQueue::submit: called");
        let (item, deferred) = WorkItem::deferred(seq, action);
        self.inner.enqueue(item)?;
        Ok(deferred)
    }

    /// Number of submitted actions not yet dispatched
    pub fn size(&self) -> usize {
        self.inner.size()
    }

    /// Configured minimum interval between dispatches
    pub fn interval(&self) -> Duration {
        self.inner.interval
    }

    /// Whether pacing is measured from completion rather than start
    pub fn await_completion(&self) -> bool {
        self.inner.await_completion
    }

    /// Get a statistics snapshot from the worker
    pub async fn stats(&self) -> Result<QueueStats, QueueError> {
        debug!("DeferredQueue::stats: called");
        self.inner.stats().await
    }
}
