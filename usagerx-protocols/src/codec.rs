//! ## usagerx-protocols::codec
//! Bounds-checked payload cursor and the sender prelude that follows the
//! routing header in every usage packet.
//!
//! Layout after the header:
//! `[host address: 16 bytes][send time: u32 BE epoch seconds]`. IPv4 senders
//! write twelve zero bytes followed by the four octets.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};

use bytes::{Buf, BufMut, BytesMut};
use chrono::{DateTime, Utc};

use usagerx_core::RawPacket;

use crate::error::DecodeError;
use crate::header::HEADER_LEN;

pub const PRELUDE_LEN: usize = 20;

/// Cursor over a payload slice. Every read checks the remaining length first
/// so a short packet yields `DecodeError::Truncated` instead of a panic.
#[derive(Debug, Clone)]
pub struct PayloadReader<'a> {
    buf: &'a [u8],
    consumed: usize,
}

impl<'a> PayloadReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, consumed: 0 }
    }

    /// Cursor positioned just past the routing header.
    pub fn after_header(packet: &'a [u8]) -> Result<Self, DecodeError> {
        let mut reader = Self::new(packet);
        reader.skip(HEADER_LEN)?;
        Ok(reader)
    }

    #[inline]
    pub fn remaining(&self) -> usize {
        self.buf.remaining()
    }

    #[inline]
    pub fn consumed(&self) -> usize {
        self.consumed
    }

    #[inline]
    fn ensure(&self, needed: usize) -> Result<(), DecodeError> {
        if self.buf.remaining() < needed {
            return Err(DecodeError::Truncated {
                needed: self.consumed + needed,
                available: self.consumed + self.buf.remaining(),
            });
        }
        Ok(())
    }

    pub fn skip(&mut self, len: usize) -> Result<(), DecodeError> {
        self.ensure(len)?;
        self.buf.advance(len);
        self.consumed += len;
        Ok(())
    }

    pub fn read_u32(&mut self) -> Result<u32, DecodeError> {
        self.ensure(4)?;
        self.consumed += 4;
        Ok(self.buf.get_u32())
    }

    pub fn read_bytes(&mut self, len: usize) -> Result<&'a [u8], DecodeError> {
        self.ensure(len)?;
        let (head, tail) = self.buf.split_at(len);
        self.buf = tail;
        self.consumed += len;
        Ok(head)
    }

    /// Everything not read yet.
    pub fn rest(&mut self) -> &'a [u8] {
        let rest = self.buf;
        self.consumed += rest.len();
        self.buf = &[];
        rest
    }
}

/// Sender address and send time written by every usage sender.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SenderPrelude {
    pub host: IpAddr,
    pub send_time: DateTime<Utc>,
}

impl SenderPrelude {
    pub fn read(reader: &mut PayloadReader<'_>) -> Result<Self, DecodeError> {
        let raw = reader.read_bytes(16)?;
        let mut octets = [0u8; 16];
        octets.copy_from_slice(raw);

        let host = if octets[..12].iter().all(|b| *b == 0) {
            IpAddr::V4(Ipv4Addr::new(octets[12], octets[13], octets[14], octets[15]))
        } else {
            IpAddr::V6(Ipv6Addr::from(octets))
        };

        let seconds = reader.read_u32()?;
        let send_time = DateTime::from_timestamp(i64::from(seconds), 0)
            .ok_or_else(|| DecodeError::out_of_range("send_time", seconds.to_string()))?;

        Ok(Self { host, send_time })
    }

    pub fn write(&self, out: &mut BytesMut) {
        match self.host {
            IpAddr::V4(v4) => {
                out.put_bytes(0, 12);
                out.put_slice(&v4.octets());
            }
            IpAddr::V6(v6) => out.put_slice(&v6.octets()),
        }
        // the wire field is 32 bits wide; times outside it wrap like the sender's
        out.put_u32(self.send_time.timestamp() as u32);
    }
}

/// Arrival metadata plus prelude, carried by every decoded record.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Envelope {
    pub source: SocketAddr,
    pub received_at: DateTime<Utc>,
    pub prelude: SenderPrelude,
}

impl Envelope {
    /// Reads the prelude of `packet` and returns the envelope together with a
    /// cursor positioned at the family-specific body.
    pub fn read(packet: &RawPacket) -> Result<(Self, PayloadReader<'_>), DecodeError> {
        let mut reader = PayloadReader::after_header(packet.bytes())?;
        let prelude = SenderPrelude::read(&mut reader)?;
        Ok((
            Self {
                source: packet.source(),
                received_at: packet.received_at(),
                prelude,
            },
            reader,
        ))
    }
}

/// Hex rendering of at most `max` leading bytes, for log lines.
pub fn hex_preview(data: &[u8], max: usize) -> String {
    let shown = &data[..data.len().min(max)];
    if data.len() > max {
        format!("{}..", hex::encode(shown))
    } else {
        hex::encode(shown)
    }
}
