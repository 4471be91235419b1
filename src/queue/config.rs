//! Queue configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

/// Pacing configuration for a throttled queue
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Minimum time between dispatches in milliseconds (0 = as fast as the runtime allows)
    #[serde(rename = "interval-ms", default = "default_interval_ms")]
    pub interval_ms: u64,

    /// Measure the interval from completion of a task instead of its start
    #[serde(rename = "await-completion", default)]
    pub await_completion: bool,
}

fn default_interval_ms() -> u64 {
    debug!("default_interval_ms: called");
    1000
}

impl Default for QueueConfig {
    fn default() -> Self {
        debug!("QueueConfig::default: called");
        Self {
            interval_ms: 1000,
            await_completion: false,
        }
    }
}

impl QueueConfig {
    /// Create a config from an interval and completion mode
    pub fn new(interval: Duration, await_completion: bool) -> Self {
        Self {
            interval_ms: u64::try_from(interval.as_millis()).unwrap_or(u64::MAX),
            await_completion,
        }
    }

    /// Get the interval as a Duration
    pub fn interval(&self) -> Duration {
        debug!(interval_ms = %self.interval_ms, "QueueConfig::interval: called");
        Duration::from_millis(self.interval_ms)
    }
}
