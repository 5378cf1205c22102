//! ## usagerx-protocols::gram5
//! GRAM5 usage packets. Both families carry a text body keyed by single
//! characters and identify their job manager by `B` (UUID) and `A` (start
//! time, fractional epoch seconds).
//!
//! - `(20, 0)` job-manager status: `D` version string, `E` local resource
//!   manager, `F` SEG (`0`) or polling (`1`), `G` audit flag, `I` restarted
//!   jobs, and `K`..`X` the job counters.
//! - `(20, 1)` job status, sent when a job finishes: `c`..`i` the times the
//!   job entered each state, per-job request counts, `j` failure code, and
//!   the job description (`3` count, `b` host count, `a` dry run, `H` job
//!   type, `6`/`7` executable and arguments, `8`/`9` client address and DN).

use chrono::{DateTime, Utc};

use usagerx_core::RawPacket;

use crate::codec::Envelope;
use crate::command::{ColumnSpec, PersistenceCommand, SqlType};
use crate::error::{DecodeError, HandlerError};
use crate::handler::{DecodedPacket, PacketHandler};
use crate::header::PacketHeader;
use crate::text::{parse_epoch_seconds, TextFields};

fn job_manager_uuid(fields: &TextFields) -> Result<String, DecodeError> {
    let uuid = fields.require("B")?;
    if uuid.is_empty() {
        return Err(DecodeError::out_of_range("B", "empty job manager uuid"));
    }
    Ok(uuid.to_string())
}

fn job_manager_start(fields: &TextFields) -> Result<Option<DateTime<Utc>>, DecodeError> {
    fields
        .get("A")
        .map(|v| parse_epoch_seconds("A", v))
        .transpose()
}

/// Counter keys in wire order with their column names.
const COUNTERS: [(&str, &str); 14] = [
    ("K", "total_jobs"),
    ("L", "total_failed"),
    ("M", "total_canceled"),
    ("N", "total_done"),
    ("O", "total_dry_run"),
    ("P", "peak_jobs"),
    ("Q", "current_jobs"),
    ("R", "unsubmitted"),
    ("S", "stage_in"),
    ("T", "pending"),
    ("U", "active"),
    ("V", "stage_out"),
    ("W", "failed"),
    ("X", "done"),
];

const COLUMNS: &[ColumnSpec] = &[
    ColumnSpec::new("source_address", SqlType::Text),
    ColumnSpec::new("received_at", SqlType::Timestamp),
    ColumnSpec::new("sender_address", SqlType::Text),
    ColumnSpec::new("send_time", SqlType::Timestamp),
    ColumnSpec::new("hostname", SqlType::Text),
    ColumnSpec::new("job_manager_uuid", SqlType::Text),
    ColumnSpec::new("start_time", SqlType::Timestamp),
    ColumnSpec::new("lifetime_secs", SqlType::Real),
    ColumnSpec::new("version", SqlType::Text),
    ColumnSpec::new("lrm", SqlType::Text),
    ColumnSpec::new("seg_used", SqlType::Integer),
    ColumnSpec::new("poll_used", SqlType::Integer),
    ColumnSpec::new("audit_used", SqlType::Integer),
    ColumnSpec::new("restarted_jobs", SqlType::Integer),
    ColumnSpec::new("total_jobs", SqlType::Integer),
    ColumnSpec::new("total_failed", SqlType::Integer),
    ColumnSpec::new("total_canceled", SqlType::Integer),
    ColumnSpec::new("total_done", SqlType::Integer),
    ColumnSpec::new("total_dry_run", SqlType::Integer),
    ColumnSpec::new("peak_jobs", SqlType::Integer),
    ColumnSpec::new("current_jobs", SqlType::Integer),
    ColumnSpec::new("unsubmitted", SqlType::Integer),
    ColumnSpec::new("stage_in", SqlType::Integer),
    ColumnSpec::new("pending", SqlType::Integer),
    ColumnSpec::new("active", SqlType::Integer),
    ColumnSpec::new("stage_out", SqlType::Integer),
    ColumnSpec::new("failed", SqlType::Integer),
    ColumnSpec::new("done", SqlType::Integer),
];

#[derive(Clone, Debug, PartialEq)]
pub struct Gram5JobManagerStatus {
    pub envelope: Envelope,
    pub hostname: Option<String>,
    pub job_manager_uuid: String,
    pub start_time: Option<DateTime<Utc>>,
    pub version: Option<String>,
    pub lrm: Option<String>,
    pub seg_used: bool,
    pub poll_used: bool,
    pub audit_used: bool,
    pub restarted_jobs: Option<i64>,
    /// Values for `K`..`X`, in that order.
    pub counters: [Option<i64>; 14],
}

impl Gram5JobManagerStatus {
    pub fn decode(packet: &RawPacket) -> Result<Self, DecodeError> {
        let (envelope, mut reader) = Envelope::read(packet)?;
        let fields = TextFields::parse(reader.rest())?;

        let job_manager_uuid = job_manager_uuid(&fields)?;
        let start_time = job_manager_start(&fields)?;

        let mut counters = [None; 14];
        for (slot, (key, _)) in counters.iter_mut().zip(COUNTERS) {
            *slot = fields.get_i64(key)?;
        }

        Ok(Self {
            envelope,
            hostname: fields.get_string("HOSTNAME"),
            job_manager_uuid,
            start_time,
            version: fields.get_string("D"),
            lrm: fields.get_string("E"),
            seg_used: fields.get("F") == Some("0"),
            poll_used: fields.get("F") == Some("1"),
            audit_used: fields.get("G") == Some("1"),
            restarted_jobs: fields.get_i64("I")?,
            counters,
        })
    }

    /// Seconds between job-manager start and the packet's send time.
    pub fn lifetime_secs(&self) -> Option<f64> {
        self.start_time.map(|start| {
            (self.envelope.prelude.send_time - start).num_milliseconds() as f64 / 1000.0
        })
    }
}

#[derive(Debug, Clone)]
pub struct Gram5JobManagerHandler {
    table: String,
}

impl Gram5JobManagerHandler {
    pub const CODES: PacketHeader = PacketHeader::new(20, 0);
    pub const NAME: &'static str = "gram5_job_manager";

    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
        }
    }
}

impl PacketHandler for Gram5JobManagerHandler {
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
        Ok(DecodedPacket::Gram5JobManager(Gram5JobManagerStatus::decode(
            packet,
        )?))
    }

    fn build_persistence_command(
        &self,
        decoded: &DecodedPacket,
    ) -> Result<PersistenceCommand, HandlerError> {
        let DecodedPacket::Gram5JobManager(record) = decoded else {
            return Err(HandlerError::SchemaMismatch {
                handler: Self::NAME,
                found: decoded.kind(),
            });
        };

        let envelope = &record.envelope;
        let mut cmd = PersistenceCommand::insert_into(self.table.as_str())
            .bind("source_address", envelope.source.to_string())
            .bind("received_at", envelope.received_at)
            .bind("sender_address", envelope.prelude.host.to_string())
            .bind("send_time", envelope.prelude.send_time)
            .bind("hostname", record.hostname.clone())
            .bind("job_manager_uuid", record.job_manager_uuid.as_str())
            .bind("start_time", record.start_time)
            .bind("lifetime_secs", record.lifetime_secs())
            .bind("version", record.version.clone())
            .bind("lrm", record.lrm.clone())
            .bind("seg_used", record.seg_used)
            .bind("poll_used", record.poll_used)
            .bind("audit_used", record.audit_used)
            .bind("restarted_jobs", record.restarted_jobs);

        for ((_, column), value) in COUNTERS.into_iter().zip(record.counters) {
            cmd = cmd.bind(column, value);
        }
        Ok(cmd)
    }
}

/// Job state transition times, `c`..`i`, with their column names.
const STATE_TIMES: [(&str, &str); 7] = [
    ("c", "unsubmitted_time"),
    ("d", "stage_in_time"),
    ("e", "pending_time"),
    ("f", "active_time"),
    ("g", "failed_time"),
    ("h", "stage_out_time"),
    ("i", "done_time"),
];

/// Per-job request counts with their column names. Absent counts are zero.
const JOB_COUNTS: [(&str, &str); 8] = [
    ("k", "status_count"),
    ("l", "register_count"),
    ("2", "unregister_count"),
    ("m", "signal_count"),
    ("n", "refresh_count"),
    ("j", "failure_code"),
    ("Y", "restart_count"),
    ("Z", "callback_count"),
];

const JOB_COLUMNS: &[ColumnSpec] = &[
    ColumnSpec::new("source_address", SqlType::Text),
    ColumnSpec::new("received_at", SqlType::Timestamp),
    ColumnSpec::new("sender_address", SqlType::Text),
    ColumnSpec::new("send_time", SqlType::Timestamp),
    ColumnSpec::new("hostname", SqlType::Text),
    ColumnSpec::new("job_manager_uuid", SqlType::Text),
    ColumnSpec::new("job_manager_start", SqlType::Timestamp),
    ColumnSpec::new("count", SqlType::Integer),
    ColumnSpec::new("host_count", SqlType::Integer),
    ColumnSpec::new("dry_run", SqlType::Integer),
    ColumnSpec::new("job_type", SqlType::Text),
    ColumnSpec::new("executable", SqlType::Text),
    ColumnSpec::new("arguments", SqlType::Text),
    ColumnSpec::new("client_address", SqlType::Text),
    ColumnSpec::new("user_dn", SqlType::Text),
    ColumnSpec::new("unsubmitted_time", SqlType::Timestamp),
    ColumnSpec::new("stage_in_time", SqlType::Timestamp),
    ColumnSpec::new("pending_time", SqlType::Timestamp),
    ColumnSpec::new("active_time", SqlType::Timestamp),
    ColumnSpec::new("failed_time", SqlType::Timestamp),
    ColumnSpec::new("stage_out_time", SqlType::Timestamp),
    ColumnSpec::new("done_time", SqlType::Timestamp),
    ColumnSpec::new("status_count", SqlType::Integer),
    ColumnSpec::new("register_count", SqlType::Integer),
    ColumnSpec::new("unregister_count", SqlType::Integer),
    ColumnSpec::new("signal_count", SqlType::Integer),
    ColumnSpec::new("refresh_count", SqlType::Integer),
    ColumnSpec::new("failure_code", SqlType::Integer),
    ColumnSpec::new("restart_count", SqlType::Integer),
    ColumnSpec::new("callback_count", SqlType::Integer),
];

/// Final status of one GRAM5 job.
#[derive(Clone, Debug, PartialEq)]
pub struct Gram5JobStatus {
    pub envelope: Envelope,
    pub hostname: Option<String>,
    pub job_manager_uuid: String,
    pub job_manager_start: Option<DateTime<Utc>>,
    pub count: i64,
    pub host_count: i64,
    pub dry_run: bool,
    pub job_type: Option<String>,
    pub executable: Option<String>,
    pub arguments: Option<String>,
    pub client_address: Option<String>,
    pub user_dn: Option<String>,
    /// Times for `c`..`i`, in that order. States the job never entered are
    /// `None`.
    pub state_times: [Option<DateTime<Utc>>; 7],
    /// Values for `JOB_COUNTS`, in that order.
    pub counts: [i64; 8],
}

impl Gram5JobStatus {
    pub fn decode(packet: &RawPacket) -> Result<Self, DecodeError> {
        let (envelope, mut reader) = Envelope::read(packet)?;
        let fields = TextFields::parse(reader.rest())?;

        let mut state_times = [None; 7];
        for (slot, (key, _)) in state_times.iter_mut().zip(STATE_TIMES) {
            // the job manager reports 0 for states a job skipped
            *slot = fields
                .get(key)
                .map(|v| parse_epoch_seconds(key, v))
                .transpose()?
                .filter(|t| t.timestamp() > 1);
        }

        let mut counts = [0; 8];
        for (slot, (key, _)) in counts.iter_mut().zip(JOB_COUNTS) {
            *slot = fields.get_i64(key)?.unwrap_or(0);
        }

        Ok(Self {
            envelope,
            hostname: fields.get_string("HOSTNAME"),
            job_manager_uuid: job_manager_uuid(&fields)?,
            job_manager_start: job_manager_start(&fields)?,
            count: fields.get_i64("3")?.unwrap_or(0),
            host_count: fields.get_i64("b")?.unwrap_or(0),
            dry_run: fields.get("a") == Some("1"),
            job_type: fields.get_string("H"),
            executable: fields.get_string("6"),
            arguments: fields.get_string("7"),
            client_address: fields.get_string("8"),
            user_dn: fields.get_string("9"),
            state_times,
            counts,
        })
    }
}

#[derive(Debug, Clone)]
pub struct Gram5JobHandler {
    table: String,
}

impl Gram5JobHandler {
    pub const CODES: PacketHeader = PacketHeader::new(20, 1);
    pub const NAME: &'static str = "gram5_job";

    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
        }
    }
}

impl PacketHandler for Gram5JobHandler {
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
        JOB_COLUMNS
    }

    fn decode(&self, packet: &RawPacket) -> Result<DecodedPacket, HandlerError> {
        Ok(DecodedPacket::Gram5Job(Gram5JobStatus::decode(packet)?))
    }

    fn build_persistence_command(
        &self,
        decoded: &DecodedPacket,
    ) -> Result<PersistenceCommand, HandlerError> {
        let DecodedPacket::Gram5Job(record) = decoded else {
            return Err(HandlerError::SchemaMismatch {
                handler: Self::NAME,
                found: decoded.kind(),
            });
        };

        let envelope = &record.envelope;
        let mut cmd = PersistenceCommand::insert_into(self.table.as_str())
            .bind("source_address", envelope.source.to_string())
            .bind("received_at", envelope.received_at)
            .bind("sender_address", envelope.prelude.host.to_string())
            .bind("send_time", envelope.prelude.send_time)
            .bind("hostname", record.hostname.clone())
            .bind("job_manager_uuid", record.job_manager_uuid.as_str())
            .bind("job_manager_start", record.job_manager_start)
            .bind("count", record.count)
            .bind("host_count", record.host_count)
            .bind("dry_run", record.dry_run)
            .bind("job_type", record.job_type.clone())
            .bind("executable", record.executable.clone())
            .bind("arguments", record.arguments.clone())
            .bind("client_address", record.client_address.clone())
            .bind("user_dn", record.user_dn.clone());

        for ((_, column), value) in STATE_TIMES.into_iter().zip(record.state_times) {
            cmd = cmd.bind(column, value);
        }
        for ((_, column), value) in JOB_COUNTS.into_iter().zip(record.counts) {
            cmd = cmd.bind(column, value);
        }
        Ok(cmd)
    }
}
