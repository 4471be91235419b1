//! throttleq - Interval-paced FIFO task queue
//!
//! throttleq rate-limits calls into a downstream resource (for example an API
//! with a requests-per-second cap) by dispatching submitted work one item at a
//! time, never faster than a fixed interval.
//!
//! # Core Concepts
//!
//! - **Strict FIFO**: work runs in submission order, each item exactly once
//! - **Pacing**: consecutive dispatch starts are at least `interval` apart
//! - **Await completion**: optionally pace from the end of one task to the
//!   start of the next
//! - **Two calling conventions**: done-signal callbacks or futures
//!
//! # Modules
//!
//! - [`queue`] - The throttled queue and its worker
//! - [`runner`] - Runs shell command lines through a queue
//! - [`config`] - Configuration types and loading
//! - [`cli`] - Command-line interface

pub mod cli;
pub mod config;
pub mod queue;
pub mod runner;

// Re-export commonly used types
pub use config::{Config, RunnerConfig};
pub use queue::{
    CallbackQueue, Clock, Deferred, DeferredError, DeferredQueue, DoneSignal, QueueConfig, QueueError, QueueStats,
    TokioClock,
};
pub use runner::{CommandReport, CommandStatus, RunSummary, parse_commands, run_commands};
