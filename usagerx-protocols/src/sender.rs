//! ## usagerx-protocols::sender
//! Encoder for text-format usage packets, the same layout a component's usage
//! library emits: header, sender prelude, `HOSTNAME=<host>`, then a space and
//! the `KEY=VALUE ` parameters.

use std::net::IpAddr;

use bytes::{BufMut, Bytes, BytesMut};
use chrono::{DateTime, Utc};

use crate::codec::SenderPrelude;
use crate::error::EncodeError;
use crate::header::PacketHeader;
use crate::text::write_pair;

/// Largest datagram a sender emits (Ethernet MTU minus IP/UDP headers).
pub const MAX_PACKET_LEN: usize = 1472;

/// Builds usage packets for one component/version identity.
#[derive(Debug, Clone)]
pub struct UsagePacketBuilder {
    header: PacketHeader,
    host: IpAddr,
    hostname: Option<String>,
}

impl UsagePacketBuilder {
    pub fn new(header: PacketHeader, host: IpAddr, hostname: Option<String>) -> Self {
        Self {
            header,
            host,
            hostname,
        }
    }

    pub fn header(&self) -> PacketHeader {
        self.header
    }

    /// Encodes one packet stamped with `send_time`.
    pub fn encode<K, V>(&self, send_time: DateTime<Utc>, params: &[(K, V)]) -> Result<Bytes, EncodeError>
    where
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut body = String::new();
        if let Some(hostname) = &self.hostname {
            if hostname.is_empty() || hostname.contains(|c: char| c.is_ascii_whitespace() || c == '"') {
                return Err(EncodeError::InvalidValue("HOSTNAME".into()));
            }
            body.push_str("HOSTNAME=");
            body.push_str(hostname);
        }
        if !params.is_empty() {
            body.push(' ');
            for (key, value) in params {
                write_pair(&mut body, key.as_ref(), value.as_ref())?;
            }
        }

        let mut out = BytesMut::with_capacity(24 + body.len());
        out.put_slice(&self.header.encode());
        SenderPrelude {
            host: self.host,
            send_time,
        }
        .write(&mut out);
        out.put_slice(body.as_bytes());

        if out.len() > MAX_PACKET_LEN {
            return Err(EncodeError::TooLarge {
                len: out.len(),
                max: MAX_PACKET_LEN,
            });
        }
        Ok(out.freeze())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{PayloadReader, PRELUDE_LEN};
    use crate::header::{parse_header, HEADER_LEN};
    use crate::text::TextFields;
    use std::net::Ipv4Addr;

    fn builder(hostname: Option<&str>) -> UsagePacketBuilder {
        UsagePacketBuilder::new(
            PacketHeader::new(0, 0),
            IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1)),
            hostname.map(str::to_owned),
        )
    }

    #[test]
    fn lays_out_header_prelude_and_body() {
        let send_time = DateTime::from_timestamp(1_000_000, 0).unwrap();
        let bytes = builder(Some("node7"))
            .encode(send_time, &[("TYPE", "RETR"), ("VER", "a b")])
            .unwrap();

        assert_eq!(parse_header(&bytes).unwrap(), PacketHeader::new(0, 0));
        let body = &bytes[HEADER_LEN + PRELUDE_LEN..];
        assert_eq!(body, b"HOSTNAME=node7 TYPE=RETR VER=\"a b\" ");

        let mut reader = PayloadReader::after_header(&bytes).unwrap();
        let prelude = SenderPrelude::read(&mut reader).unwrap();
        assert_eq!(prelude.send_time, send_time);
        let fields = TextFields::parse(reader.rest()).unwrap();
        assert_eq!(fields.get("VER"), Some("a b"));
    }

    #[test]
    fn omits_separator_without_params() {
        let bytes = builder(Some("node7"))
            .encode::<&str, &str>(Utc::now(), &[])
            .unwrap();
        assert_eq!(&bytes[HEADER_LEN + PRELUDE_LEN..], b"HOSTNAME=node7");
    }

    #[test]
    fn rejects_oversized_packet() {
        let big = "x".repeat(MAX_PACKET_LEN);
        assert!(matches!(
            builder(None).encode(Utc::now(), &[("BLOB", big.as_str())]),
            Err(EncodeError::TooLarge { max: MAX_PACKET_LEN, .. })
        ));
    }
}
