//! Queue worker: owns the pending FIFO and the pacing state machine
//!
//! All pacing state lives on a single tokio task. Handles talk to it over an
//! unbounded channel, so there is never more than one logical thread touching
//! the queue, the last-dispatch timestamp, or the in-flight slot.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use futures::StreamExt;
use futures::stream::FuturesUnordered;
use tokio::sync::mpsc;
use tokio::time::{Instant, sleep_until};
use tracing::{debug, info};

use super::clock::Clock;
use super::messages::{QueueRequest, QueueStats};
use super::unit::{Completion, Outcome, WorkItem};

/// Where the dequeue loop currently stands
enum Phase {
    /// Nothing armed; the next submission triggers an attempt
    Idle,

    /// One retry armed for the given deadline
    Armed(Instant),

    /// A dispatch holds the queue until its completion resolves
    InFlight(Completion),
}

impl Phase {
    fn name(&self) -> &'static str {
        match self {
            Phase::Idle => "idle",
            Phase::Armed(_) => "armed",
            Phase::InFlight(_) => "in-flight",
        }
    }
}

/// What woke the worker up
enum Event {
    Request(Option<QueueRequest>),
    Retry,
    Completed(Outcome),
    Detached(Outcome),
}

/// The queue worker task state
pub(crate) struct Dispatcher {
    interval: Duration,
    await_completion: bool,
    clock: Arc<dyn Clock>,
    pending: VecDeque<WorkItem>,
    depth: Arc<AtomicUsize>,
    last_dispatch: Option<Instant>,
    phase: Phase,
    /// Completions of dispatches the queue does not wait on
    ///
    /// Deferred actions run inside these, so they are first polled in push
    /// (dispatch) order.
    detached: FuturesUnordered<Completion>,
    stats: QueueStats,
}

impl Dispatcher {
    pub(crate) fn new(
        interval: Duration,
        await_completion: bool,
        clock: Arc<dyn Clock>,
        depth: Arc<AtomicUsize>,
    ) -> Self {
        debug!(?interval, await_completion, "Dispatcher::new: called");
        Self {
            interval,
            await_completion,
            clock,
            pending: VecDeque::new(),
            depth,
            last_dispatch: None,
            phase: Phase::Idle,
            detached: FuturesUnordered::new(),
            stats: QueueStats::default(),
        }
    }

    /// Run the worker
    ///
    /// Runs until every handle has been dropped, the remaining work has been
    /// dispatched and every deferred action has settled.
    pub(crate) async fn run(mut self, mut rx: mpsc::UnboundedReceiver<QueueRequest>) {
        info!(interval = ?self.interval, await_completion = self.await_completion, "Queue worker started");
        let mut open = true;

        loop {
            // Detached completions still carry deferred results; keep driving them
            if !open
                && self.pending.is_empty()
                && !matches!(self.phase, Phase::InFlight(_))
                && self.detached.is_empty()
            {
                break;
            }

            match self.next_event(&mut rx, open).await {
                Event::Request(Some(req)) => self.handle_request(req),
                Event::Request(None) => {
                    debug!(pending = self.pending.len(), "Dispatcher::run: all handles dropped, draining");
                    open = false;
                }
                Event::Retry => {
                    debug!("Dispatcher::run: retry deadline reached");
                    self.attempt();
                }
                Event::Completed(outcome) => {
                    debug!(?outcome, "Dispatcher::run: in-flight dispatch completed");
                    self.record(outcome);
                    self.arm_after_interval();
                }
                Event::Detached(outcome) => self.record(outcome),
            }
        }

        info!(
            dispatched = self.stats.total_dispatched,
            failed = self.stats.total_failed,
            "Queue worker stopped"
        );
    }

    async fn next_event(&mut self, rx: &mut mpsc::UnboundedReceiver<QueueRequest>, open: bool) -> Event {
        let deadline = match self.phase {
            Phase::Armed(deadline) => Some(deadline),
            _ => None,
        };
        let Self { phase, detached, .. } = self;

        tokio::select! {
            req = rx.recv(), if open => Event::Request(req),
            _ = sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => Event::Retry,
            outcome = in_flight(phase) => Event::Completed(outcome),
            Some(outcome) = detached.next(), if !detached.is_empty() => Event::Detached(outcome),
        }
    }

    fn handle_request(&mut self, req: QueueRequest) {
        match req {
            QueueRequest::Submit(item) => {
                debug!(seq = item.seq(), phase = self.phase.name(), "Dispatcher::handle_request: submit");
                self.pending.push_back(item);
                self.stats.total_submitted += 1;
                self.stats.peak_queue_depth = self.stats.peak_queue_depth.max(self.pending.len());

                if matches!(self.phase, Phase::Idle) {
                    self.attempt();
                }
            }
            QueueRequest::GetStats { reply_tx } => {
                debug!("Dispatcher::handle_request: stats");
                let _ = reply_tx.send(self.snapshot());
            }
        }
    }

    /// One dequeue attempt
    fn attempt(&mut self) {
        let now = self.clock.now();

        // Timers may fire ahead of the clock; always re-check the window
        if let Some(last) = self.last_dispatch {
            let elapsed = now.saturating_duration_since(last);
            if elapsed < self.interval {
                let remaining = self.interval - elapsed;
                debug!(?elapsed, ?remaining, "Dispatcher::attempt: pacing window open, re-arming");
                self.stats.pacing_retries += 1;
                self.phase = Phase::Armed(Instant::now() + remaining);
                return;
            }
        }

        self.last_dispatch = Some(now);

        let Some(item) = self.pending.pop_front() else {
            debug!("Dispatcher::attempt: queue empty, going idle");
            self.phase = Phase::Idle;
            return;
        };
        self.depth.fetch_sub(1, Ordering::SeqCst);
        self.stats.total_dispatched += 1;

        let seq = item.seq();
        debug!(seq, remaining = self.pending.len(), "Dispatcher::attempt: dispatching");
        let completion = item.run();

        if self.await_completion {
            self.phase = Phase::InFlight(completion);
        } else {
            self.detached.push(completion);
            self.arm_after_interval();
        }
    }

    fn arm_after_interval(&mut self) {
        self.phase = Phase::Armed(Instant::now() + self.interval);
    }

    fn record(&mut self, outcome: Outcome) {
        match outcome {
            Outcome::Succeeded => self.stats.total_succeeded += 1,
            Outcome::Failed => self.stats.total_failed += 1,
            Outcome::Abandoned => self.stats.total_abandoned += 1,
        }
    }

    fn snapshot(&self) -> QueueStats {
        QueueStats {
            queued: self.pending.len(),
            in_flight: matches!(self.phase, Phase::InFlight(_)),
            ..self.stats.clone()
        }
    }
}

/// Resolves with the in-flight completion, or never if nothing is in flight
async fn in_flight(phase: &mut Phase) -> Outcome {
    match phase {
        Phase::InFlight(completion) => completion.await,
        _ => std::future::pending().await,
    }
}
