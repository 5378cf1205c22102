//! # usagerx-protocols
//!
//! Wire formats of grid usage packets: the routing header, the sender
//! prelude, the text key/value body, and one `PacketHandler` per
//! `(component, version)` family that decodes a packet and builds its
//! parameterized insert.

pub mod codec;
pub mod command;
pub mod error;
pub mod gram5;
pub mod gridftp;
pub mod handler;
pub mod header;
pub mod sender;
pub mod text;

pub use codec::{hex_preview, Envelope, PayloadReader, SenderPrelude};
pub use command::{ColumnSpec, PersistenceCommand, SqlType, SqlValue};
pub use error::{DecodeError, EncodeError, HandlerError};
pub use gram5::{Gram5JobHandler, Gram5JobManagerHandler, Gram5JobManagerStatus, Gram5JobStatus};
pub use gridftp::{GridFtpTransfer, GridFtpTransferHandler, TransferType};
pub use handler::{DecodedPacket, PacketHandler};
pub use header::{parse_header, PacketHeader, HEADER_LEN};
pub use sender::{UsagePacketBuilder, MAX_PACKET_LEN};
