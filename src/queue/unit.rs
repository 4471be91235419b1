//! Work items and the calling conventions adapted onto them
//!
//! Every submission becomes a [`WorkItem`]: a one-shot unit that, when run,
//! starts the caller's action and returns a [`Completion`] future telling the
//! worker when the slot is free again. Signal-style and deferred-style actions
//! are thin adapters over that single contract.

use std::any::Any;
use std::fmt;
use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::pin::Pin;
use std::task::{Context, Poll};

use futures::FutureExt;
use futures::future::{self, BoxFuture};
use tokio::sync::oneshot;
use tracing::{debug, warn};

use super::messages::DeferredError;

/// Resolves once the queue may consider a dispatch finished
pub(crate) type Completion = BoxFuture<'static, Outcome>;

/// How a dispatched unit of work ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Outcome {
    Succeeded,
    Failed,
    Abandoned,
}

/// A queued unit of work
pub(crate) struct WorkItem {
    seq: u64,
    unit: Box<dyn FnOnce() -> Completion + Send>,
}

impl fmt::Debug for WorkItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkItem").field("seq", &self.seq).finish_non_exhaustive()
    }
}

impl WorkItem {
    /// Wrap a signal-style action
    ///
    /// When `await_completion` is false the action gets an inert signal and the
    /// dispatch is complete as soon as the action returns.
    pub(crate) fn signal<F>(seq: u64, action: F, await_completion: bool) -> Self
    where
        F: FnOnce(DoneSignal) + Send + 'static,
    {
        debug!(seq, await_completion, "WorkItem::signal: called");
        let unit = move || -> Completion {
            if !await_completion {
                action(DoneSignal::inert());
                return future::ready(Outcome::Succeeded).boxed();
            }

            let (done_tx, done_rx) = oneshot::channel();
            action(DoneSignal::new(done_tx));
            async move {
                match done_rx.await {
                    Ok(()) => Outcome::Succeeded,
                    Err(_) => {
                        warn!(seq, "Done signal dropped without being called, treating as complete");
                        Outcome::Abandoned
                    }
                }
            }
            .boxed()
        };

        Self {
            seq,
            unit: Box::new(unit),
        }
    }

    /// Wrap a deferred-style action, returning the caller's side of the result
    ///
    /// The action's future becomes the completion itself and is driven by the
    /// worker, so it is first polled in dispatch order. Its settlement settles
    /// the returned [`Deferred`] whether or not the queue waits for it.
    pub(crate) fn deferred<F, Fut, T, E>(seq: u64, action: F) -> (Self, Deferred<T, E>)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        T: Send + 'static,
        E: Send + 'static,
    {
        debug!(seq, "WorkItem::deferred: called");
        let (settle_tx, settle_rx) = oneshot::channel();

        let unit = move || -> Completion {
            let fut = action();
            async move {
                // A panic inside the future must not take the worker down with it
                match AssertUnwindSafe(fut).catch_unwind().await {
                    Ok(Ok(value)) => {
                        let _ = settle_tx.send(Ok(value));
                        Outcome::Succeeded
                    }
                    Ok(Err(reason)) => {
                        let _ = settle_tx.send(Err(reason));
                        Outcome::Failed
                    }
                    Err(payload) => {
                        warn!(seq, panic = %panic_message(payload.as_ref()), "Deferred action panicked");
                        Outcome::Abandoned
                    }
                }
            }
            .boxed()
        };

        let item = Self {
            seq,
            unit: Box::new(unit),
        };
        (item, Deferred { rx: settle_rx })
    }

    /// Sequence number assigned at submission
    pub(crate) fn seq(&self) -> u64 {
        self.seq
    }

    /// Invoke the action
    ///
    /// A panic raised while invoking the action is contained here and reported
    /// as an immediately completed failure.
    pub(crate) fn run(self) -> Completion {
        let seq = self.seq;
        let unit = self.unit;
        match panic::catch_unwind(AssertUnwindSafe(unit)) {
            Ok(completion) => completion,
            Err(payload) => {
                warn!(seq, panic = %panic_message(payload.as_ref()), "Action panicked during dispatch");
                future::ready(Outcome::Failed).boxed()
            }
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("<non-string panic payload>")
}

/// Completion signal handed to signal-style actions
///
/// Call [`DoneSignal::done`] once the action's work has finished. Dropping the
/// signal without calling it also frees the queue, since it can never fire
/// afterwards.
pub struct DoneSignal {
    tx: Option<oneshot::Sender<()>>,
}

impl DoneSignal {
    fn new(tx: oneshot::Sender<()>) -> Self {
        Self { tx: Some(tx) }
    }

    fn inert() -> Self {
        Self { tx: None }
    }

    /// Mark the action's work as finished
    pub fn done(mut self) {
        if let Some(tx) = self.tx.take() {
            let _ = tx.send(());
        }
    }

    /// Whether the queue is waiting on this signal
    pub fn is_awaited(&self) -> bool {
        self.tx.is_some()
    }
}

impl fmt::Debug for DoneSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DoneSignal").field("awaited", &self.is_awaited()).finish()
    }
}

/// Result of a task submitted to a [`DeferredQueue`](super::DeferredQueue)
///
/// Settles exactly once, when the task's own future settles.
#[must_use = "dropping a Deferred discards the task's result"]
pub struct Deferred<T, E> {
    rx: oneshot::Receiver<Result<T, E>>,
}

impl<T, E> Future for Deferred<T, E> {
    type Output = Result<T, DeferredError<E>>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        Pin::new(&mut this.rx).poll(cx).map(|settled| match settled {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(reason)) => Err(DeferredError::Rejected(reason)),
            Err(_) => Err(DeferredError::Abandoned),
        })
    }
}

impl<T, E> fmt::Debug for Deferred<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Deferred").finish_non_exhaustive()
    }
}
