//! ## usagerx-protocols::header
//! Routing header shared by every usage packet: two big-endian signed 16-bit
//! codes naming the sending component and its packet format version.

use crate::error::DecodeError;

/// Size of the routing header in bytes.
pub const HEADER_LEN: usize = 4;

/// `(component_code, version_code)` pair used to select a handler.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct PacketHeader {
    pub component_code: i16,
    pub version_code: i16,
}

impl PacketHeader {
    pub const fn new(component_code: i16, version_code: i16) -> Self {
        Self {
            component_code,
            version_code,
        }
    }

    pub fn encode(&self) -> [u8; HEADER_LEN] {
        let c = self.component_code.to_be_bytes();
        let v = self.version_code.to_be_bytes();
        [c[0], c[1], v[0], v[1]]
    }
}

impl std::fmt::Display for PacketHeader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {})", self.component_code, self.version_code)
    }
}

/// Reads the header from the first four bytes of `data`.
///
/// Does not consume anything; handlers parse their payload from a cursor of
/// their own.
pub fn parse_header(data: &[u8]) -> Result<PacketHeader, DecodeError> {
    if data.len() < HEADER_LEN {
        return Err(DecodeError::Truncated {
            needed: HEADER_LEN,
            available: data.len(),
        });
    }

    Ok(PacketHeader {
        component_code: i16::from_be_bytes([data[0], data[1]]),
        version_code: i16::from_be_bytes([data[2], data[3]]),
    })
}
