//! Database location and per-handler destination tables.

use serde::{Deserialize, Serialize};
use validator::{self, Validate};

use crate::validation;

#[derive(Debug, Serialize, Deserialize, Validate, Clone)]
#[serde(default)]
pub struct DatabaseConfig {
    /// SQLite database file.
    #[validate(length(min = 1))]
    pub path: String,

    #[validate(range(max = 60_000))]
    pub busy_timeout_ms: u64,

    /// Create missing handler tables at startup.
    pub auto_provision: bool,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: "usage.db".into(),
            busy_timeout_ms: 5000,
            auto_provision: false,
        }
    }
}

/// Destination table for each built-in handler.
#[derive(Debug, Serialize, Deserialize, Validate, Clone)]
#[serde(default)]
pub struct TableConfig {
    #[validate(custom(function = validation::validate_identifier))]
    pub gridftp_transfer: String,

    #[validate(custom(function = validation::validate_identifier))]
    pub gram5_job_manager: String,

    #[validate(custom(function = validation::validate_identifier))]
    pub gram5_job: String,

    #[validate(custom(function = validation::validate_identifier))]
    pub dead_letter: String,
}

impl Default for TableConfig {
    fn default() -> Self {
        Self {
            gridftp_transfer: "gftp_transfers".into(),
            gram5_job_manager: "gram5_job_manager_status".into(),
            gram5_job: "gram5_job_status".into(),
            dead_letter: "usage_dead_letter".into(),
        }
    }
}
