//! ## usagerx-engine::receiver
//! Lifecycle of a running receiver: one listener thread, `N` dispatch threads
//! and the queue between them.
//!
//! `Stopped -> Listening -> Draining -> Stopped`. Shutdown stops the listener
//! first, then gives the consumers until the grace deadline to empty the
//! queue (or no time at all when draining is disabled).

use std::net::SocketAddr;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use tracing::{info, instrument, warn};

use usagerx_config::ReceiverConfig;
use usagerx_core::{RawPacket, RingBuffer};
use usagerx_storage::PersistenceSink;
use usagerx_telemetry::{CounterSnapshot, ReceiverMetrics};

use crate::dead_letter::DeadLetter;
use crate::dispatch::Dispatcher;
use crate::error::ReceiverError;
use crate::listener::UdpListener;
use crate::registry::HandlerRegistry;
use crate::shutdown::ShutdownSignal;

const LISTENER_THREAD: &str = "usagerx-listener";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReceiverState {
    Stopped,
    Listening,
    Draining,
}

pub struct UsageReceiver {
    queue: Arc<RingBuffer<RawPacket>>,
    metrics: ReceiverMetrics,
    shutdown: Arc<ShutdownSignal>,
    state: Arc<RwLock<ReceiverState>>,
    local_addr: SocketAddr,
    drain: bool,
    grace_period: Duration,
    listener: Option<JoinHandle<()>>,
    consumers: Vec<JoinHandle<usize>>,
}

impl UsageReceiver {
    /// Binds the listen socket and spawns every thread. Returns once the
    /// receiver is `Listening`.
    #[instrument(skip_all, fields(bind = %config.listener.bind_addr))]
    pub fn start(
        config: &ReceiverConfig,
        registry: HandlerRegistry,
        sink: Arc<dyn PersistenceSink>,
    ) -> Result<Self, ReceiverError> {
        let queue = Arc::new(RingBuffer::with_capacity(config.queue.capacity)?);
        let listener = UdpListener::bind(
            &config.listener.bind_addr,
            config.read_timeout(),
            config.listener.recv_buffer_size,
        )?;
        let local_addr = listener.local_addr()?;

        let metrics = ReceiverMetrics::new();
        let dead_letter = config
            .dead_letter
            .enabled
            .then(|| DeadLetter::new(config.tables.dead_letter.as_str()));
        let dispatcher = Arc::new(
            Dispatcher::new(Arc::new(registry), sink, metrics.clone())
                .with_retry(config.dispatch.persist_attempts, config.retry_backoff())
                .with_dead_letter(dead_letter),
        );

        let mut receiver = Self {
            queue,
            metrics,
            shutdown: Arc::new(ShutdownSignal::new()),
            state: Arc::new(RwLock::new(ReceiverState::Stopped)),
            local_addr,
            drain: config.shutdown.drain,
            grace_period: config.grace_period(),
            listener: None,
            consumers: Vec::with_capacity(config.queue.consumers),
        };

        let poll_interval = config.poll_interval();
        for i in 0..config.queue.consumers {
            let name = format!("usagerx-dispatch-{i}");
            let dispatcher = Arc::clone(&dispatcher);
            let queue = Arc::clone(&receiver.queue);
            let shutdown = Arc::clone(&receiver.shutdown);
            let handle = thread::Builder::new()
                .name(name.clone())
                .spawn(move || dispatcher.run(&queue, &shutdown, poll_interval))
                .map_err(|source| ReceiverError::Spawn { name, source })?;
            receiver.consumers.push(handle);
        }

        let queue = Arc::clone(&receiver.queue);
        let metrics = receiver.metrics.clone();
        let shutdown = Arc::clone(&receiver.shutdown);
        let handle = thread::Builder::new()
            .name(LISTENER_THREAD.into())
            .spawn(move || listener.run(&queue, &metrics, &shutdown))
            .map_err(|source| ReceiverError::Spawn {
                name: LISTENER_THREAD.into(),
                source,
            })?;
        receiver.listener = Some(handle);

        *receiver.state.write() = ReceiverState::Listening;
        info!(
            %local_addr,
            consumers = config.queue.consumers,
            capacity = config.queue.capacity,
            "Usage receiver listening"
        );
        Ok(receiver)
    }

    pub fn state(&self) -> ReceiverState {
        *self.state.read()
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn metrics(&self) -> &ReceiverMetrics {
        &self.metrics
    }

    pub fn queue_len(&self) -> usize {
        self.queue.size()
    }

    /// Stops the listener, drains within the grace period, and joins every
    /// thread. Returns the final counters.
    #[instrument(skip(self), fields(addr = %self.local_addr))]
    pub fn shutdown(mut self) -> Result<CounterSnapshot, ReceiverError> {
        *self.state.write() = ReceiverState::Draining;
        self.shutdown.request();

        let mut result = Ok(());
        if let Some(listener) = self.listener.take() {
            if listener.join().is_err() {
                result = Err(ReceiverError::ThreadPanicked(LISTENER_THREAD.into()));
            }
        }

        let grace = if self.drain {
            self.grace_period
        } else {
            Duration::ZERO
        };
        self.shutdown.set_deadline(Instant::now() + grace);
        self.queue.close();
        info!(queued = self.queue.size(), grace_ms = grace.as_millis() as u64, "Draining");

        let mut dispatched = 0;
        for (i, consumer) in self.consumers.drain(..).enumerate() {
            match consumer.join() {
                Ok(count) => dispatched += count,
                Err(_) => {
                    if result.is_ok() {
                        result = Err(ReceiverError::ThreadPanicked(format!(
                            "usagerx-dispatch-{i}"
                        )));
                    }
                }
            }
        }

        let abandoned = self.queue.size();
        self.metrics.queue_depth.set(abandoned as i64);
        if abandoned > 0 {
            warn!(abandoned, "Shutdown left packets undispatched");
        }
        *self.state.write() = ReceiverState::Stopped;

        let snapshot = self.metrics.snapshot();
        info!(dispatched, persisted = snapshot.persisted, "Usage receiver stopped");
        result.map(|()| snapshot)
    }

    /// Signals every thread to stop without waiting for them. Used on error
    /// paths where the receiver is dropped without `shutdown`.
    fn abort(&self) {
        self.shutdown.request();
        self.shutdown.set_deadline(Instant::now());
        self.queue.close();
    }
}

impl Drop for UsageReceiver {
    fn drop(&mut self) {
        if self.listener.is_some() || !self.consumers.is_empty() {
            self.abort();
        }
    }
}

impl std::fmt::Debug for UsageReceiver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UsageReceiver")
            .field("local_addr", &self.local_addr)
            .field("state", &self.state())
            .field("queued", &self.queue.size())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use usagerx_storage::MemorySink;

    fn config() -> ReceiverConfig {
        let mut config = ReceiverConfig::default();
        config.listener.bind_addr = "127.0.0.1:0".into();
        config.listener.read_timeout_ms = 20;
        config.queue.consumers = 2;
        config.queue.poll_interval_ms = 10;
        config
    }

    #[test]
    fn lifecycle_states() {
        let config = config();
        let receiver = UsageReceiver::start(
            &config,
            HandlerRegistry::with_defaults(&config.tables),
            Arc::new(MemorySink::new()),
        )
        .unwrap();
        assert_eq!(receiver.state(), ReceiverState::Listening);
        assert_ne!(receiver.local_addr().port(), 0);

        let state = Arc::clone(&receiver.state);
        let snapshot = receiver.shutdown().unwrap();
        assert_eq!(*state.read(), ReceiverState::Stopped);
        assert_eq!(snapshot, CounterSnapshot::default());
    }

    #[test]
    fn zero_capacity_is_rejected() {
        let mut config = config();
        config.queue.capacity = 0;
        assert!(matches!(
            UsageReceiver::start(&config, HandlerRegistry::new(), Arc::new(MemorySink::new())),
            Err(ReceiverError::Queue(_))
        ));
    }

    #[test]
    fn unbindable_address_is_fatal() {
        let mut config = config();
        config.listener.bind_addr = "203.0.113.1:4810".into();
        assert!(matches!(
            UsageReceiver::start(&config, HandlerRegistry::new(), Arc::new(MemorySink::new())),
            Err(ReceiverError::Bind { .. })
        ));
    }
}
