//! Logging and counter reporting.

use serde::{Deserialize, Serialize};
use validator::{self, Validate};

use crate::validation;

#[derive(Debug, Serialize, Deserialize, Validate, Clone)]
#[serde(default)]
pub struct TelemetryConfig {
    /// Default filter when `RUST_LOG` is unset.
    #[validate(custom(function = validation::validate_log_level))]
    pub log_level: String,

    /// Seconds between counter reports; 0 disables them.
    #[validate(range(max = 86_400))]
    pub report_interval_secs: u64,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: "info".into(),
            report_interval_secs: 60,
        }
    }
}
