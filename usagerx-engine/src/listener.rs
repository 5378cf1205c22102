//! ## usagerx-engine::listener
//! Blocking UDP receive loop. Each datagram becomes a `RawPacket` stamped
//! with its arrival time and source and is offered to the queue; a full queue
//! drops the datagram.

use std::io::ErrorKind;
use std::net::{SocketAddr, UdpSocket};
use std::thread;
use std::time::Duration;

use bytes::Bytes;
use chrono::Utc;
use tracing::{error, info, trace, warn};

use usagerx_core::{RawPacket, RingBuffer};
use usagerx_telemetry::ReceiverMetrics;

use crate::error::ReceiverError;
use crate::shutdown::ShutdownSignal;

#[derive(Debug)]
pub struct UdpListener {
    socket: UdpSocket,
    buffer_size: usize,
    read_timeout: Duration,
}

impl UdpListener {
    /// Binds `addr`. The read timeout bounds how long `run` takes to notice
    /// a shutdown request.
    pub fn bind(addr: &str, read_timeout: Duration, buffer_size: usize) -> Result<Self, ReceiverError> {
        let socket = UdpSocket::bind(addr).map_err(|source| ReceiverError::Bind {
            addr: addr.to_string(),
            source,
        })?;
        socket
            .set_read_timeout(Some(read_timeout))
            .map_err(ReceiverError::Socket)?;

        Ok(Self {
            socket,
            buffer_size,
            read_timeout,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, ReceiverError> {
        self.socket.local_addr().map_err(ReceiverError::Socket)
    }

    /// Receives until `shutdown` is requested. Socket errors are logged and
    /// never end the loop.
    pub fn run(
        &self,
        queue: &RingBuffer<RawPacket>,
        metrics: &ReceiverMetrics,
        shutdown: &ShutdownSignal,
    ) {
        let mut buf = vec![0u8; self.buffer_size];
        info!(addr = ?self.socket.local_addr().ok(), "Usage listener started");

        while !shutdown.is_requested() {
            match self.socket.recv_from(&mut buf) {
                Ok((len, source)) => {
                    metrics.received.inc();
                    let packet =
                        RawPacket::new(Bytes::copy_from_slice(&buf[..len]), Utc::now(), source);
                    if queue.insert(packet) {
                        metrics.queue_depth.set(queue.size() as i64);
                        trace!(%source, len, "Queued datagram");
                    } else {
                        metrics.dropped_full_queue.inc();
                        warn!(%source, len, capacity = queue.capacity(), "Queue full, dropped datagram");
                    }
                }
                Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {
                    continue;
                }
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => {
                    error!(error = %e, "Usage socket receive failed");
                    thread::sleep(self.read_timeout);
                }
            }
        }
        info!("Usage listener stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn bind_failure_is_reported() {
        let taken = UdpSocket::bind("127.0.0.1:0").unwrap();
        let addr = taken.local_addr().unwrap().to_string();
        let err = UdpListener::bind(&addr, Duration::from_millis(50), 2048).unwrap_err();
        assert!(matches!(err, ReceiverError::Bind { .. }));
    }

    #[test]
    fn queues_datagrams_and_counts_overflow() {
        let listener = Arc::new(UdpListener::bind("127.0.0.1:0", Duration::from_millis(20), 2048).unwrap());
        let target = listener.local_addr().unwrap();
        let queue = Arc::new(RingBuffer::with_capacity(2).unwrap());
        let metrics = ReceiverMetrics::new();
        let shutdown = Arc::new(ShutdownSignal::new());

        let handle = {
            let (listener, queue, metrics, shutdown) =
                (listener.clone(), queue.clone(), metrics.clone(), shutdown.clone());
            thread::spawn(move || listener.run(&queue, &metrics, &shutdown))
        };

        let client = UdpSocket::bind("127.0.0.1:0").unwrap();
        for i in 0..4u8 {
            client.send_to(&[0, 0, 0, i], target).unwrap();
        }

        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        while metrics.snapshot().received < 4 && std::time::Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        shutdown.request();
        handle.join().unwrap();

        let snap = metrics.snapshot();
        assert_eq!(snap.received, 4);
        assert_eq!(snap.dropped_full_queue, 2);
        let first = queue.remove_next().unwrap();
        assert_eq!(first.bytes(), &[0, 0, 0, 0]);
        assert_eq!(first.source(), client.local_addr().unwrap());
        assert_eq!(queue.remove_next().unwrap().bytes(), &[0, 0, 0, 1]);
        assert!(queue.is_empty());
    }
}
