//! ## usagerx-engine::dispatch
//! Routes one packet at a time: header, handler, decode, command, sink.
//!
//! Every packet ends in exactly one `DispatchOutcome` and bumps exactly one
//! counter. No outcome stops the loop.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use tracing::{debug, error, trace, warn};

use usagerx_core::{RawPacket, RingBuffer};
use usagerx_protocols::{hex_preview, parse_header, HandlerError, PersistenceCommand};
use usagerx_storage::{PersistenceError, PersistenceSink};
use usagerx_telemetry::ReceiverMetrics;

use crate::dead_letter::DeadLetter;
use crate::registry::HandlerRegistry;
use crate::shutdown::ShutdownSignal;

/// Bytes of a rejected payload shown at `trace` level.
const PREVIEW_LEN: usize = 32;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DispatchOutcome {
    Persisted,
    Malformed,
    Unroutable,
    SchemaMismatch,
    PersistFailed,
}

impl DispatchOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            DispatchOutcome::Persisted => "persisted",
            DispatchOutcome::Malformed => "malformed",
            DispatchOutcome::Unroutable => "unroutable",
            DispatchOutcome::SchemaMismatch => "schema_mismatch",
            DispatchOutcome::PersistFailed => "persist_failure",
        }
    }
}

pub struct Dispatcher {
    registry: Arc<HandlerRegistry>,
    sink: Arc<dyn PersistenceSink>,
    metrics: ReceiverMetrics,
    dead_letter: Option<DeadLetter>,
    persist_attempts: u32,
    retry_backoff: Duration,
}

impl Dispatcher {
    pub fn new(
        registry: Arc<HandlerRegistry>,
        sink: Arc<dyn PersistenceSink>,
        metrics: ReceiverMetrics,
    ) -> Self {
        Self {
            registry,
            sink,
            metrics,
            dead_letter: None,
            persist_attempts: 1,
            retry_backoff: Duration::ZERO,
        }
    }

    /// Tries each insert up to `attempts` times (at least once).
    #[must_use]
    pub fn with_retry(mut self, attempts: u32, backoff: Duration) -> Self {
        self.persist_attempts = attempts.max(1);
        self.retry_backoff = backoff;
        self
    }

    #[must_use]
    pub fn with_dead_letter(mut self, dead_letter: Option<DeadLetter>) -> Self {
        self.dead_letter = dead_letter;
        self
    }

    pub fn metrics(&self) -> &ReceiverMetrics {
        &self.metrics
    }

    /// Consumer loop. Returns the number of packets dispatched.
    ///
    /// Exits once the queue is closed and drained, or once `shutdown` says
    /// to abandon whatever is left.
    pub fn run(
        &self,
        queue: &RingBuffer<RawPacket>,
        shutdown: &ShutdownSignal,
        poll_interval: Duration,
    ) -> usize {
        let mut dispatched = 0;
        loop {
            if shutdown.should_abandon() {
                debug!(left = queue.size(), "Drain deadline reached");
                break;
            }
            match queue.remove_next_timeout(poll_interval) {
                Some(packet) => {
                    self.metrics.queue_depth.set(queue.size() as i64);
                    self.dispatch(&packet);
                    dispatched += 1;
                }
                None if queue.is_closed() && queue.is_empty() => break,
                None => {}
            }
        }
        dispatched
    }

    pub fn dispatch(&self, packet: &RawPacket) -> DispatchOutcome {
        let header = match parse_header(packet.bytes()) {
            Ok(header) => header,
            Err(e) => return self.reject(DispatchOutcome::Malformed, &e.to_string(), packet),
        };

        let Some(handler) = self.registry.resolve(header) else {
            return self.reject(
                DispatchOutcome::Unroutable,
                &format!("no handler for {header}"),
                packet,
            );
        };

        let command = handler
            .decode(packet)
            .and_then(|decoded| handler.build_persistence_command(&decoded));
        let command = match command {
            Ok(command) => command,
            Err(HandlerError::Malformed(e)) => {
                return self.reject(
                    DispatchOutcome::Malformed,
                    &format!("{}: {e}", handler.name()),
                    packet,
                )
            }
            Err(e @ HandlerError::SchemaMismatch { .. }) => {
                return self.reject(DispatchOutcome::SchemaMismatch, &e.to_string(), packet)
            }
        };

        match self.persist(&command) {
            Ok(()) => {
                self.metrics.persisted.inc();
                debug!(
                    handler = handler.name(),
                    table = command.table(),
                    source = %packet.source(),
                    "Persisted usage packet"
                );
                DispatchOutcome::Persisted
            }
            Err(e) => self.reject(DispatchOutcome::PersistFailed, &e.to_string(), packet),
        }
    }

    fn persist(&self, command: &PersistenceCommand) -> Result<(), PersistenceError> {
        let mut attempt = 1;
        loop {
            match self.sink.write(command) {
                Ok(()) => return Ok(()),
                Err(e) if attempt < self.persist_attempts => {
                    debug!(attempt, error = %e, "Insert failed, retrying");
                    thread::sleep(self.retry_backoff);
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn reject(&self, outcome: DispatchOutcome, detail: &str, packet: &RawPacket) -> DispatchOutcome {
        let source = packet.source();
        match outcome {
            DispatchOutcome::Malformed => {
                self.metrics.dropped_malformed.inc();
                debug!(%source, len = packet.len(), detail, "Dropped malformed packet");
            }
            DispatchOutcome::Unroutable => {
                self.metrics.dropped_unroutable.inc();
                warn!(%source, detail, "Dropped unroutable packet");
            }
            DispatchOutcome::SchemaMismatch => {
                self.metrics.dropped_schema_mismatch.inc();
                error!(%source, detail, "Dropped packet on schema mismatch");
            }
            DispatchOutcome::PersistFailed => {
                self.metrics.dropped_persist_failure.inc();
                warn!(%source, detail, "Dropped packet after failed insert");
            }
            DispatchOutcome::Persisted => {}
        }
        trace!(payload = %hex_preview(packet.bytes(), PREVIEW_LEN), "Rejected payload");

        if let Some(dead_letter) = &self.dead_letter {
            let row = dead_letter.command(outcome, detail, packet);
            if let Err(e) = self.sink.write(&row) {
                warn!(table = dead_letter.table(), error = %e, "Dead-letter insert failed");
            }
        }
        outcome
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("handlers", &self.registry.len())
            .field("dead_letter", &self.dead_letter)
            .field("persist_attempts", &self.persist_attempts)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{IpAddr, Ipv4Addr};
    use std::sync::atomic::{AtomicUsize, Ordering};

    use bytes::Bytes;
    use chrono::{DateTime, Utc};
    use tracing_test::traced_test;

    use usagerx_config::TableConfig;
    use usagerx_core::RawPacket;
    use usagerx_protocols::{
        ColumnSpec, DecodedPacket, GridFtpTransferHandler, PacketHandler, PacketHeader, SqlValue,
        UsagePacketBuilder,
    };
    use usagerx_storage::MemorySink;

    fn source() -> std::net::SocketAddr {
        "192.0.2.10:4810".parse().unwrap()
    }

    fn text_transfer() -> RawPacket {
        let bytes = UsagePacketBuilder::new(
            GridFtpTransferHandler::CODES,
            IpAddr::V4(Ipv4Addr::new(192, 0, 2, 10)),
            Some("gridftp.example.org".into()),
        )
        .encode(
            DateTime::from_timestamp(1_230_811_299, 0).unwrap(),
            &[
                ("START", "20090101120000.000000"),
                ("END", "20090101120100.000000"),
                ("NBYTES", "504"),
                ("TYPE", "RETR"),
            ],
        )
        .unwrap();
        RawPacket::new(bytes, Utc::now(), source())
    }

    fn dispatcher(sink: Arc<MemorySink>) -> Dispatcher {
        Dispatcher::new(
            Arc::new(HandlerRegistry::with_defaults(&TableConfig::default())),
            sink,
            ReceiverMetrics::new(),
        )
    }

    #[test]
    fn persists_routed_packet() {
        let sink = Arc::new(MemorySink::new());
        let dispatcher = dispatcher(sink.clone());

        assert_eq!(dispatcher.dispatch(&text_transfer()), DispatchOutcome::Persisted);

        let rows = sink.rows_for("gftp_transfers");
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].value("num_bytes"), Some(&SqlValue::Integer(504)));
        assert_eq!(dispatcher.metrics().snapshot().persisted, 1);
    }

    #[traced_test]
    #[test]
    fn unroutable_packet_is_counted_and_skipped() {
        let sink = Arc::new(MemorySink::new());
        let dispatcher = dispatcher(sink.clone());
        let packet = RawPacket::new(Bytes::from_static(&[0, 7, 0, 3, 1, 2]), Utc::now(), source());

        assert_eq!(dispatcher.dispatch(&packet), DispatchOutcome::Unroutable);
        assert!(sink.is_empty());
        let snap = dispatcher.metrics().snapshot();
        assert_eq!(snap.dropped_unroutable, 1);
        assert_eq!(snap.dispatched(), 1);
        assert!(logs_contain("Dropped unroutable packet"));
    }

    #[test]
    fn short_packet_is_malformed() {
        let sink = Arc::new(MemorySink::new());
        let dispatcher = dispatcher(sink.clone());
        let packet = RawPacket::new(Bytes::from_static(&[0, 0, 0]), Utc::now(), source());

        assert_eq!(dispatcher.dispatch(&packet), DispatchOutcome::Malformed);
        assert_eq!(dispatcher.metrics().snapshot().dropped_malformed, 1);
        assert!(sink.is_empty());
    }

    #[test]
    fn garbled_body_is_malformed() {
        let sink = Arc::new(MemorySink::new());
        let dispatcher = dispatcher(sink.clone());
        let mut bytes = vec![0, 0, 0, 0];
        bytes.extend_from_slice(&[0u8; 20]);
        bytes.push(b'S');
        let packet = RawPacket::new(Bytes::from(bytes), Utc::now(), source());

        assert_eq!(dispatcher.dispatch(&packet), DispatchOutcome::Malformed);
        assert_eq!(dispatcher.metrics().snapshot().dropped_malformed, 1);
    }

    #[test]
    fn sink_failure_is_counted_and_loop_continues() {
        let sink = Arc::new(MemorySink::new());
        let dispatcher = dispatcher(sink.clone());

        sink.set_reject(true);
        assert_eq!(
            dispatcher.dispatch(&text_transfer()),
            DispatchOutcome::PersistFailed
        );
        sink.set_reject(false);
        assert_eq!(dispatcher.dispatch(&text_transfer()), DispatchOutcome::Persisted);

        let snap = dispatcher.metrics().snapshot();
        assert_eq!(snap.dropped_persist_failure, 1);
        assert_eq!(snap.persisted, 1);
        assert_eq!(sink.len(), 1);
    }

    /// Sink failing the first `failures` writes.
    struct Flaky {
        failures: usize,
        calls: AtomicUsize,
        inner: MemorySink,
    }

    impl PersistenceSink for Flaky {
        fn write(&self, command: &PersistenceCommand) -> Result<(), PersistenceError> {
            if self.calls.fetch_add(1, Ordering::SeqCst) < self.failures {
                return Err(PersistenceError::Rejected {
                    table: command.table().into(),
                    reason: "busy".into(),
                });
            }
            self.inner.write(command)
        }
    }

    #[test]
    fn bounded_retry() {
        let flaky = Arc::new(Flaky {
            failures: 2,
            calls: AtomicUsize::new(0),
            inner: MemorySink::new(),
        });
        let registry = Arc::new(HandlerRegistry::with_defaults(&TableConfig::default()));

        let retrying = Dispatcher::new(registry.clone(), flaky.clone(), ReceiverMetrics::new())
            .with_retry(3, Duration::from_millis(1));
        assert_eq!(retrying.dispatch(&text_transfer()), DispatchOutcome::Persisted);
        assert_eq!(flaky.calls.load(Ordering::SeqCst), 3);

        flaky.calls.store(0, Ordering::SeqCst);
        let single = Dispatcher::new(registry, flaky.clone(), ReceiverMetrics::new())
            .with_retry(2, Duration::ZERO);
        assert_eq!(single.dispatch(&text_transfer()), DispatchOutcome::PersistFailed);
        assert_eq!(flaky.calls.load(Ordering::SeqCst), 2);
    }

    /// Handler that routes GridFTP packets but claims a foreign record.
    struct Confused;

    impl PacketHandler for Confused {
        fn name(&self) -> &'static str {
            "confused"
        }
        fn codes(&self) -> PacketHeader {
            GridFtpTransferHandler::CODES
        }
        fn table(&self) -> &str {
            "confused"
        }
        fn columns(&self) -> &'static [ColumnSpec] {
            &[]
        }
        fn decode(&self, packet: &RawPacket) -> Result<DecodedPacket, HandlerError> {
            GridFtpTransferHandler::new("x").decode(packet)
        }
        fn build_persistence_command(
            &self,
            decoded: &DecodedPacket,
        ) -> Result<PersistenceCommand, HandlerError> {
            Err(HandlerError::SchemaMismatch {
                handler: "confused",
                found: decoded.kind(),
            })
        }
    }

    #[test]
    fn schema_mismatch_is_counted_and_dead_lettered() {
        let sink = Arc::new(MemorySink::new());
        let mut registry = HandlerRegistry::new();
        registry.register(Confused);
        let dispatcher = Dispatcher::new(Arc::new(registry), sink.clone(), ReceiverMetrics::new())
            .with_dead_letter(Some(DeadLetter::new("usage_dead_letter")));

        assert_eq!(
            dispatcher.dispatch(&text_transfer()),
            DispatchOutcome::SchemaMismatch
        );
        assert_eq!(dispatcher.metrics().snapshot().dropped_schema_mismatch, 1);

        let rows = sink.rows_for("usage_dead_letter");
        assert_eq!(rows.len(), 1);
        assert_eq!(
            rows[0].value("reason"),
            Some(&SqlValue::Text("schema_mismatch".into()))
        );
        assert_eq!(sink.len(), 1);
    }

    #[test]
    fn failed_dead_letter_keeps_primary_counter() {
        let sink = Arc::new(MemorySink::new());
        sink.set_reject(true);
        let dispatcher = dispatcher(sink.clone())
            .with_dead_letter(Some(DeadLetter::new("usage_dead_letter")));

        assert_eq!(
            dispatcher.dispatch(&text_transfer()),
            DispatchOutcome::PersistFailed
        );
        let snap = dispatcher.metrics().snapshot();
        assert_eq!(snap.dropped_persist_failure, 1);
        assert_eq!(snap.dispatched(), 1);
    }

    #[test]
    fn run_drains_closed_queue() {
        let sink = Arc::new(MemorySink::new());
        let dispatcher = dispatcher(sink.clone());
        let queue = RingBuffer::with_capacity(8).unwrap();
        for _ in 0..3 {
            assert!(queue.insert(text_transfer()));
        }
        assert!(queue.insert(RawPacket::new(
            Bytes::from_static(&[0, 9, 0, 9]),
            Utc::now(),
            source()
        )));
        queue.close();

        let shutdown = ShutdownSignal::new();
        let dispatched = dispatcher.run(&queue, &shutdown, Duration::from_millis(10));

        assert_eq!(dispatched, 4);
        assert_eq!(sink.len(), 3);
        let snap = dispatcher.metrics().snapshot();
        assert_eq!(snap.persisted, 3);
        assert_eq!(snap.dropped_unroutable, 1);
        assert_eq!(snap.queue_depth, 0);
    }

    #[test]
    fn run_abandons_after_deadline() {
        let sink = Arc::new(MemorySink::new());
        let dispatcher = dispatcher(sink.clone());
        let queue = RingBuffer::with_capacity(8).unwrap();
        for _ in 0..5 {
            assert!(queue.insert(text_transfer()));
        }

        let shutdown = ShutdownSignal::new();
        shutdown.request();
        shutdown.set_deadline(std::time::Instant::now());

        assert_eq!(dispatcher.run(&queue, &shutdown, Duration::from_millis(10)), 0);
        assert_eq!(queue.size(), 5);
        assert!(sink.is_empty());
    }

    #[test]
    fn header_with_unknown_codes_from_builder() {
        let sink = Arc::new(MemorySink::new());
        let dispatcher = dispatcher(sink);
        let bytes = UsagePacketBuilder::new(
            PacketHeader::new(3, 1),
            IpAddr::V4(Ipv4Addr::LOCALHOST),
            None,
        )
        .encode(Utc::now(), &[("K", "V")])
        .unwrap();
        assert_eq!(
            dispatcher.dispatch(&RawPacket::new(bytes, Utc::now(), source())),
            DispatchOutcome::Unroutable
        );
    }
}
