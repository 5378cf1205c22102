//! ## usagerx-protocols::handler
//! Capability contract every packet family implements, and the tagged union
//! of decoded records.
//!
//! A handler owns one `(component, version)` identity. It decodes raw packets
//! into its own `DecodedPacket` variant and is the only code that turns that
//! variant into a `PersistenceCommand`; handed any other variant it reports
//! `HandlerError::SchemaMismatch` instead of guessing.

use usagerx_core::RawPacket;

use crate::command::{ColumnSpec, PersistenceCommand};
use crate::error::HandlerError;
use crate::gram5::{Gram5JobManagerStatus, Gram5JobStatus};
use crate::gridftp::GridFtpTransfer;
use crate::header::PacketHeader;

/// Decoded usage record, one variant per handler.
#[derive(Clone, Debug, PartialEq)]
pub enum DecodedPacket {
    GridFtpTransfer(GridFtpTransfer),
    Gram5JobManager(Gram5JobManagerStatus),
    Gram5Job(Gram5JobStatus),
}

impl DecodedPacket {
    /// Stable name of the variant, used in logs and mismatch errors.
    pub fn kind(&self) -> &'static str {
        match self {
            DecodedPacket::GridFtpTransfer(_) => "gridftp_transfer",
            DecodedPacket::Gram5JobManager(_) => "gram5_job_manager",
            DecodedPacket::Gram5Job(_) => "gram5_job",
        }
    }
}

/// Decode and persistence logic for one packet family.
pub trait PacketHandler: Send + Sync {
    /// Short identifier, e.g. `gridftp_transfer`.
    fn name(&self) -> &'static str;

    /// Routing codes this handler owns.
    fn codes(&self) -> PacketHeader;

    /// Destination table.
    fn table(&self) -> &str;

    /// Columns written by `build_persistence_command`, in binding order.
    fn columns(&self) -> &'static [ColumnSpec];

    /// Exact-equality test against the owned codes.
    fn matches(&self, component_code: i16, version_code: i16) -> bool {
        let codes = self.codes();
        codes.component_code == component_code && codes.version_code == version_code
    }

    fn decode(&self, packet: &RawPacket) -> Result<DecodedPacket, HandlerError>;

    fn build_persistence_command(
        &self,
        decoded: &DecodedPacket,
    ) -> Result<PersistenceCommand, HandlerError>;
}

impl std::fmt::Debug for dyn PacketHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PacketHandler")
            .field("name", &self.name())
            .field("codes", &self.codes())
            .field("table", &self.table())
            .finish()
    }
}
