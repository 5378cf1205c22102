//! # usagerx-telemetry
//!
//! Logging setup and the receiver's counters.

pub mod logging;
pub mod metrics;

pub use metrics::{CounterSnapshot, ReceiverMetrics};
