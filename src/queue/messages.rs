//! Requests, errors and statistics for the queue worker

use serde::Serialize;
use thiserror::Error;
use tokio::sync::oneshot;

use super::unit::WorkItem;

/// Errors surfaced by queue handles
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueueError {
    #[error("queue worker has shut down")]
    Closed,
}

/// Why a [`Deferred`](super::Deferred) did not resolve to a value
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeferredError<E> {
    /// The task's own future returned an error
    #[error("task rejected: {0}")]
    Rejected(E),

    /// The task panicked or was torn down before it settled
    #[error("task abandoned before it settled")]
    Abandoned,
}

impl<E> DeferredError<E> {
    /// Get the rejection reason, if the task settled with one
    pub fn rejection(&self) -> Option<&E> {
        match self {
            DeferredError::Rejected(reason) => Some(reason),
            DeferredError::Abandoned => None,
        }
    }
}

/// Internal requests to the queue worker task
#[derive(Debug)]
pub(crate) enum QueueRequest {
    /// Append a work item to the tail of the queue
    Submit(WorkItem),

    /// Get a statistics snapshot
    GetStats { reply_tx: oneshot::Sender<QueueStats> },
}

/// Statistics for a queue
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct QueueStats {
    /// Work items received by the worker
    pub total_submitted: u64,
    /// Work items pulled off the queue and invoked
    pub total_dispatched: u64,
    /// Dispatches whose completion was observed as successful
    pub total_succeeded: u64,
    /// Dispatches that panicked or whose future returned an error
    pub total_failed: u64,
    /// Dispatches that finished without signalling (dropped signal or lost task)
    pub total_abandoned: u64,
    /// Dequeue attempts that found the pacing window still open
    pub pacing_retries: u64,
    /// Largest number of items waiting at once
    pub peak_queue_depth: usize,
    /// Items currently waiting
    pub queued: usize,
    /// Whether a dispatch is holding the queue (await-completion only)
    pub in_flight: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deferred_error_rejection() {
        let err: DeferredError<&str> = DeferredError::Rejected("boom");
        assert_eq!(err.rejection(), Some(&"boom"));
        assert_eq!(err.to_string(), "task rejected: boom");

        let err: DeferredError<&str> = DeferredError::Abandoned;
        assert_eq!(err.rejection(), None);
    }

    #[test]
    fn test_stats_serialization() {
        let stats = QueueStats {
            total_submitted: 3,
            total_dispatched: 2,
            queued: 1,
            ..Default::default()
        };

        let json = serde_json::to_string(&stats).unwrap();
        assert!(json.contains("\"total-submitted\":3"));
        assert!(json.contains("\"queued\":1"));
        assert!(json.contains("\"in-flight\":false"));
    }
}
