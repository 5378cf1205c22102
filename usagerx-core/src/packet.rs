//! Raw datagram type and arrival metadata.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use std::net::SocketAddr;

/// Undecoded usage packet as received from the transport.
///
/// Fields are private so a packet cannot change after construction; the
/// payload is a `Bytes` handle, so moving a packet between stages never copies
/// the datagram.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RawPacket {
    bytes: Bytes,
    received_at: DateTime<Utc>,
    source: SocketAddr,
}

impl RawPacket {
    #[inline]
    pub fn new(bytes: Bytes, received_at: DateTime<Utc>, source: SocketAddr) -> Self {
        Self {
            bytes,
            received_at,
            source,
        }
    }

    /// Wraps a datagram stamped with the current wall-clock time.
    #[inline]
    pub fn received_now(bytes: Bytes, source: SocketAddr) -> Self {
        Self::new(bytes, Utc::now(), source)
    }

    #[inline]
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Cheap clone of the underlying buffer.
    #[inline]
    pub fn payload(&self) -> Bytes {
        self.bytes.clone()
    }

    #[inline]
    pub fn received_at(&self) -> DateTime<Utc> {
        self.received_at
    }

    #[inline]
    pub fn source(&self) -> SocketAddr {
        self.source
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}
