//! Custom validation functions for configuration.

use std::net::SocketAddr;

use lazy_static::lazy_static;
use regex::Regex;
use validator::ValidationError;

lazy_static! {
    static ref LOG_LEVEL: Regex =
        Regex::new("^(trace|debug|info|warn|error)$").expect("log level pattern is valid");
}

/// Validate that a listen address parses as `ip:port`.
pub fn validate_socket_addr(addr: &str) -> Result<(), ValidationError> {
    addr.parse::<SocketAddr>()
        .map(|_| ())
        .map_err(|_| ValidationError::new("invalid_socket_addr"))
}

/// Validate that a table name is a plain SQL identifier, using the same check
/// the storage layer applies before writing.
pub fn validate_identifier(name: &str) -> Result<(), ValidationError> {
    if usagerx_storage::is_valid_identifier(name) {
        Ok(())
    } else {
        Err(ValidationError::new("invalid_sql_identifier"))
    }
}

/// Validate a `tracing` level name.
pub fn validate_log_level(level: &str) -> Result<(), ValidationError> {
    if LOG_LEVEL.is_match(&level.to_lowercase()) {
        Ok(())
    } else {
        Err(ValidationError::new("invalid_log_level"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn socket_addr() {
        assert!(validate_socket_addr("0.0.0.0:4810").is_ok());
        assert!(validate_socket_addr("[::1]:4810").is_ok());
        assert!(validate_socket_addr("localhost").is_err());
        assert!(validate_socket_addr("0.0.0.0:99999").is_err());
    }

    #[test]
    fn identifier() {
        assert!(validate_identifier("gftp_transfers").is_ok());
        assert!(validate_identifier("x; DROP TABLE y").is_err());
        assert!(validate_identifier("").is_err());
        assert!(validate_identifier(&"t".repeat(63)).is_ok());
        assert!(validate_identifier(&"t".repeat(64)).is_err());
        for name in ["gram5_job_status", "1table", "t\"x", "schema.table"] {
            assert_eq!(
                validate_identifier(name).is_ok(),
                usagerx_storage::is_valid_identifier(name),
                "{name}"
            );
        }
    }

    #[test]
    fn log_level() {
        assert!(validate_log_level("INFO").is_ok());
        assert!(validate_log_level("verbose").is_err());
    }
}
