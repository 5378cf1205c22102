//! Dispatch loop policy: shutdown drain, write retries, dead-letter.

use serde::{Deserialize, Serialize};
use validator::{self, Validate};

/// What happens to queued packets when the receiver stops.
#[derive(Debug, Serialize, Deserialize, Validate, Clone)]
#[serde(default)]
pub struct ShutdownConfig {
    /// Keep dispatching queued packets after the listener stops.
    pub drain: bool,

    /// Upper bound on the drain; packets left after it are abandoned.
    #[validate(range(max = 600_000))]
    pub grace_period_ms: u64,
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self {
            drain: true,
            grace_period_ms: 5000,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Validate, Clone)]
#[serde(default)]
pub struct DispatchConfig {
    /// Total tries per insert, including the first.
    #[validate(range(min = 1, max = 5))]
    pub persist_attempts: u32,

    /// Pause between tries.
    #[validate(range(max = 10_000))]
    pub retry_backoff_ms: u64,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            persist_attempts: 1,
            retry_backoff_ms: 50,
        }
    }
}

/// Record rejected packets in the dead-letter table.
#[derive(Debug, Default, Serialize, Deserialize, Validate, Clone)]
#[serde(default)]
pub struct DeadLetterConfig {
    pub enabled: bool,
}
