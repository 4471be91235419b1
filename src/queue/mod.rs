//! Throttled task queue
//!
//! Enforces a minimum interval between the start (or, with
//! `await_completion`, the completion) of successive units of work, dispatched
//! in strict submission order.
//!
//! Two calling conventions are offered over the same worker:
//! - [`CallbackQueue`]: actions receive a [`DoneSignal`]
//! - [`DeferredQueue`]: actions return futures and each submission yields a [`Deferred`]

mod clock;
mod config;
mod core;
mod handle;
mod messages;
mod unit;

pub use clock::{Clock, TokioClock};
pub use config::QueueConfig;
pub use handle::{CallbackQueue, DeferredQueue};
pub use messages::{DeferredError, QueueError, QueueStats};
pub use unit::{Deferred, DoneSignal};
