//! ## usagerx-protocols::gridftp
//! GridFTP file-transfer usage packets, `(0, 0)`.
//!
//! The server sends the sender prelude followed by a text body:
//! `HOSTNAME`, `START`, `END`, `VER`, `BUFFER`, `BLOCK`, `NBYTES`, `STREAMS`,
//! `STRIPES`, `TYPE` and `CODE`. `START`, `END`, `NBYTES` and `TYPE` are
//! required; the rest bind `NULL` when absent.

use chrono::{DateTime, Utc};

use usagerx_core::RawPacket;

use crate::codec::Envelope;
use crate::command::{ColumnSpec, PersistenceCommand, SqlType};
use crate::error::{DecodeError, HandlerError};
use crate::handler::{DecodedPacket, PacketHandler};
use crate::header::PacketHeader;
use crate::text::{parse_compact_timestamp, TextFields};

/// Direction of a GridFTP transfer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TransferType {
    Store,
    Retrieve,
    ExtendedStore,
    ExtendedRetrieve,
}

impl TransferType {
    pub fn keyword(&self) -> &'static str {
        match self {
            TransferType::Store => "STOR",
            TransferType::Retrieve => "RETR",
            TransferType::ExtendedStore => "ESTO",
            TransferType::ExtendedRetrieve => "ERET",
        }
    }

    pub fn from_keyword(keyword: &str) -> Option<Self> {
        match keyword {
            "STOR" => Some(TransferType::Store),
            "RETR" => Some(TransferType::Retrieve),
            "ESTO" => Some(TransferType::ExtendedStore),
            "ERET" => Some(TransferType::ExtendedRetrieve),
            _ => None,
        }
    }
}

const COLUMNS: &[ColumnSpec] = &[
    ColumnSpec::new("source_address", SqlType::Text),
    ColumnSpec::new("received_at", SqlType::Timestamp),
    ColumnSpec::new("sender_address", SqlType::Text),
    ColumnSpec::new("send_time", SqlType::Timestamp),
    ColumnSpec::new("transfer_type", SqlType::Text),
    ColumnSpec::new("start_time", SqlType::Timestamp),
    ColumnSpec::new("end_time", SqlType::Timestamp),
    ColumnSpec::new("num_bytes", SqlType::Integer),
    ColumnSpec::new("num_stripes", SqlType::Integer),
    ColumnSpec::new("num_streams", SqlType::Integer),
    ColumnSpec::new("buffer_size", SqlType::Integer),
    ColumnSpec::new("block_size", SqlType::Integer),
    ColumnSpec::new("ftp_return_code", SqlType::Integer),
    ColumnSpec::new("gridftp_version", SqlType::Text),
    ColumnSpec::new("hostname", SqlType::Text),
];

/// One completed transfer as reported by a GridFTP server.
#[derive(Clone, Debug, PartialEq)]
pub struct GridFtpTransfer {
    pub envelope: Envelope,
    pub transfer_type: TransferType,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub num_bytes: i64,
    pub num_stripes: Option<i64>,
    pub num_streams: Option<i64>,
    pub buffer_size: Option<i64>,
    pub block_size: Option<i64>,
    pub ftp_return_code: Option<i64>,
    pub gridftp_version: Option<String>,
    pub hostname: Option<String>,
}

impl GridFtpTransfer {
    pub fn decode(packet: &RawPacket) -> Result<Self, DecodeError> {
        let (envelope, mut reader) = Envelope::read(packet)?;
        let fields = TextFields::parse(reader.rest())?;

        let type_keyword = fields.require("TYPE")?;
        let transfer_type = TransferType::from_keyword(type_keyword)
            .ok_or_else(|| DecodeError::out_of_range("TYPE", type_keyword))?;

        let num_bytes = fields.require_i64("NBYTES")?;
        if num_bytes < 0 {
            return Err(DecodeError::out_of_range("NBYTES", num_bytes.to_string()));
        }

        Ok(Self {
            envelope,
            transfer_type,
            start_time: parse_compact_timestamp("START", fields.require("START")?)?,
            end_time: parse_compact_timestamp("END", fields.require("END")?)?,
            num_bytes,
            num_stripes: fields.get_i64("STRIPES")?,
            num_streams: fields.get_i64("STREAMS")?,
            buffer_size: fields.get_i64("BUFFER")?,
            block_size: fields.get_i64("BLOCK")?,
            ftp_return_code: fields.get_i64("CODE")?,
            gridftp_version: fields.get_string("VER"),
            hostname: fields.get_string("HOSTNAME"),
        })
    }
}

/// Handler for GridFTP transfer packets.
#[derive(Debug, Clone)]
pub struct GridFtpTransferHandler {
    table: String,
}

impl GridFtpTransferHandler {
    pub const CODES: PacketHeader = PacketHeader::new(0, 0);
    pub const NAME: &'static str = "gridftp_transfer";

    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
        }
    }
}

impl PacketHandler for GridFtpTransferHandler {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn codes(&self) -> PacketHeader {
        Self::CODES
    }

    fn table(&self) -> &str {
        &self.table
    }

    fn columns(&self) -> &'static [ColumnSpec] {
        COLUMNS
    }

    fn decode(&self, packet: &RawPacket) -> Result<DecodedPacket, HandlerError> {
        Ok(DecodedPacket::GridFtpTransfer(GridFtpTransfer::decode(packet)?))
    }

    fn build_persistence_command(
        &self,
        decoded: &DecodedPacket,
    ) -> Result<PersistenceCommand, HandlerError> {
        let DecodedPacket::GridFtpTransfer(record) = decoded else {
            return Err(HandlerError::SchemaMismatch {
                handler: Self::NAME,
                found: decoded.kind(),
            });
        };

        let envelope = &record.envelope;
        Ok(PersistenceCommand::insert_into(self.table.as_str())
            .bind("source_address", envelope.source.to_string())
            .bind("received_at", envelope.received_at)
            .bind("sender_address", envelope.prelude.host.to_string())
            .bind("send_time", envelope.prelude.send_time)
            .bind("transfer_type", record.transfer_type.keyword())
            .bind("start_time", record.start_time)
            .bind("end_time", record.end_time)
            .bind("num_bytes", record.num_bytes)
            .bind("num_stripes", record.num_stripes)
            .bind("num_streams", record.num_streams)
            .bind("buffer_size", record.buffer_size)
            .bind("block_size", record.block_size)
            .bind("ftp_return_code", record.ftp_return_code)
            .bind("gridftp_version", record.gridftp_version.clone())
            .bind("hostname", record.hostname.clone()))
    }
}
