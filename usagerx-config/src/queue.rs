//! Queue sizing and consumer pool.

use serde::{Deserialize, Serialize};
use validator::{self, Validate};

/// Bounded queue between the listener and the dispatch threads.
#[derive(Debug, Serialize, Deserialize, Validate, Clone)]
#[serde(default)]
pub struct QueueConfig {
    /// Fixed slot count; inserts beyond it are dropped and counted.
    #[validate(range(min = 1, max = 1_048_576))]
    pub capacity: usize,

    /// Number of dispatch threads draining the queue.
    #[validate(range(min = 1, max = 64))]
    pub consumers: usize,

    /// Longest a consumer blocks before re-checking for shutdown.
    #[validate(range(min = 1, max = 10_000))]
    pub poll_interval_ms: u64,
}

fn default_consumers() -> usize {
    num_cpus::get().clamp(1, 4)
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            capacity: 1024,
            consumers: default_consumers(),
            poll_interval_ms: 100,
        }
    }
}
