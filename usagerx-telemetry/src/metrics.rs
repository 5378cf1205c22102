//! ## usagerx-telemetry::metrics
//! Prometheus counters for the receive and dispatch paths.
//!
//! Every packet taken off the wire ends in exactly one of: `dropped_full_queue`
//! (listener), or one of `persisted`, `dropped_unroutable`,
//! `dropped_malformed`, `dropped_schema_mismatch`, `dropped_persist_failure`
//! (dispatch). Packets still queued when shutdown gives up are in none.

use prometheus::{Encoder, IntCounter, IntGauge, Registry, TextEncoder};
use serde::Serialize;

#[derive(Debug, Clone)]
pub struct ReceiverMetrics {
    pub registry: Registry,
    pub received: IntCounter,
    pub dropped_full_queue: IntCounter,
    pub dropped_unroutable: IntCounter,
    pub dropped_malformed: IntCounter,
    pub dropped_schema_mismatch: IntCounter,
    pub dropped_persist_failure: IntCounter,
    pub persisted: IntCounter,
    pub queue_depth: IntGauge,
}

/// Point-in-time copy of the counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CounterSnapshot {
    pub received: u64,
    pub dropped_full_queue: u64,
    pub dropped_unroutable: u64,
    pub dropped_malformed: u64,
    pub dropped_schema_mismatch: u64,
    pub dropped_persist_failure: u64,
    pub persisted: u64,
    pub queue_depth: i64,
}

impl CounterSnapshot {
    /// Packets that reached a terminal outcome in the dispatch loop.
    pub fn dispatched(&self) -> u64 {
        self.persisted
            + self.dropped_unroutable
            + self.dropped_malformed
            + self.dropped_schema_mismatch
            + self.dropped_persist_failure
    }
}

impl Default for ReceiverMetrics {
    fn default() -> Self {
        Self::new()
    }
}

fn counter(registry: &Registry, name: &str, help: &str) -> IntCounter {
    let counter = IntCounter::new(name, help).expect("counter descriptor is valid");
    registry
        .register(Box::new(counter.clone()))
        .expect("counter registered once");
    counter
}

impl ReceiverMetrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let received = counter(
            &registry,
            "usagerx_received_total",
            "Datagrams read from the listen socket",
        );
        let dropped_full_queue = counter(
            &registry,
            "usagerx_dropped_full_queue_total",
            "Datagrams discarded because the queue was full",
        );
        let dropped_unroutable = counter(
            &registry,
            "usagerx_dropped_unroutable_total",
            "Packets with no handler for their header codes",
        );
        let dropped_malformed = counter(
            &registry,
            "usagerx_dropped_malformed_total",
            "Packets that failed header or payload decoding",
        );
        let dropped_schema_mismatch = counter(
            &registry,
            "usagerx_dropped_schema_mismatch_total",
            "Decoded records a handler refused to persist",
        );
        let dropped_persist_failure = counter(
            &registry,
            "usagerx_dropped_persist_failure_total",
            "Records whose insert failed",
        );
        let persisted = counter(
            &registry,
            "usagerx_persisted_total",
            "Records written to the store",
        );

        let queue_depth = IntGauge::new("usagerx_queue_depth", "Packets waiting in the queue")
            .expect("gauge descriptor is valid");
        registry
            .register(Box::new(queue_depth.clone()))
            .expect("gauge registered once");

        Self {
            registry,
            received,
            dropped_full_queue,
            dropped_unroutable,
            dropped_malformed,
            dropped_schema_mismatch,
            dropped_persist_failure,
            persisted,
            queue_depth,
        }
    }

    pub fn snapshot(&self) -> CounterSnapshot {
        CounterSnapshot {
            received: self.received.get(),
            dropped_full_queue: self.dropped_full_queue.get(),
            dropped_unroutable: self.dropped_unroutable.get(),
            dropped_malformed: self.dropped_malformed.get(),
            dropped_schema_mismatch: self.dropped_schema_mismatch.get(),
            dropped_persist_failure: self.dropped_persist_failure.get(),
            persisted: self.persisted.get(),
            queue_depth: self.queue_depth.get(),
        }
    }

    /// Text exposition of every registered metric.
    pub fn gather_metrics(&self) -> Result<String, prometheus::Error> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::<u8>::new();
        encoder.encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_tracks_counters() {
        let metrics = ReceiverMetrics::new();
        metrics.received.inc_by(5);
        metrics.persisted.inc_by(2);
        metrics.dropped_malformed.inc();
        metrics.dropped_unroutable.inc();
        metrics.dropped_full_queue.inc();
        metrics.queue_depth.set(4);

        let snap = metrics.snapshot();
        assert_eq!(snap.received, 5);
        assert_eq!(snap.dispatched(), 4);
        assert_eq!(snap.dropped_full_queue, 1);
        assert_eq!(snap.queue_depth, 4);
    }

    #[test]
    fn clones_share_counters() {
        let metrics = ReceiverMetrics::new();
        let other = metrics.clone();
        other.persisted.inc();
        assert_eq!(metrics.snapshot().persisted, 1);
    }

    #[test]
    fn exposition_names_every_metric() {
        let text = ReceiverMetrics::new().gather_metrics().unwrap();
        for name in [
            "usagerx_received_total",
            "usagerx_dropped_full_queue_total",
            "usagerx_dropped_unroutable_total",
            "usagerx_dropped_malformed_total",
            "usagerx_dropped_schema_mismatch_total",
            "usagerx_dropped_persist_failure_total",
            "usagerx_persisted_total",
            "usagerx_queue_depth",
        ] {
            assert!(text.contains(name), "{name} missing");
        }
    }
}
