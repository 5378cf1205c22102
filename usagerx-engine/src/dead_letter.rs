//! Dead-letter rows for packets the dispatch loop could not store.

use chrono::Utc;

use usagerx_core::RawPacket;
use usagerx_protocols::{parse_header, ColumnSpec, PersistenceCommand, SqlType};

use crate::dispatch::DispatchOutcome;

pub const DEAD_LETTER_COLUMNS: &[ColumnSpec] = &[
    ColumnSpec::new("reason", SqlType::Text),
    ColumnSpec::new("detail", SqlType::Text),
    ColumnSpec::new("component_code", SqlType::Integer),
    ColumnSpec::new("version_code", SqlType::Integer),
    ColumnSpec::new("source_address", SqlType::Text),
    ColumnSpec::new("received_at", SqlType::Timestamp),
    ColumnSpec::new("recorded_at", SqlType::Timestamp),
    ColumnSpec::new("payload", SqlType::Blob),
];

#[derive(Debug, Clone)]
pub struct DeadLetter {
    table: String,
}

impl DeadLetter {
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
        }
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn columns(&self) -> &'static [ColumnSpec] {
        DEAD_LETTER_COLUMNS
    }

    /// Row describing why `packet` was dropped. Header codes are `NULL` when
    /// the packet is too short to carry them.
    pub fn command(
        &self,
        outcome: DispatchOutcome,
        detail: &str,
        packet: &RawPacket,
    ) -> PersistenceCommand {
        let header = parse_header(packet.bytes()).ok();
        PersistenceCommand::insert_into(self.table.as_str())
            .bind("reason", outcome.as_str())
            .bind("detail", detail)
            .bind("component_code", header.map(|h| i64::from(h.component_code)))
            .bind("version_code", header.map(|h| i64::from(h.version_code)))
            .bind("source_address", packet.source().to_string())
            .bind("received_at", packet.received_at())
            .bind("recorded_at", Utc::now())
            .bind("payload", packet.bytes().to_vec())
    }
}
