//! Time source used for pacing decisions

use tokio::time::Instant;

/// Source of "now" for the pacing check
///
/// The queue arms its retries on tokio's timer but always re-validates the
/// elapsed time against this clock before dispatching, so a timer that fires
/// early never lets a dispatch through ahead of its window.
pub trait Clock: Send + Sync + 'static {
    fn now(&self) -> Instant;
}

/// Clock backed by tokio's monotonic instant (respects paused time in tests)
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioClock;

impl Clock for TokioClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}
