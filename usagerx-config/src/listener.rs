//! UDP listener configuration.

use serde::{Deserialize, Deserializer, Serialize};
use validator::{self, Validate};

use crate::validation;

/// Listen socket parameters.
#[derive(Debug, Serialize, Deserialize, Validate, Clone)]
#[serde(default)]
pub struct ListenerConfig {
    /// Address the usage socket binds to.
    #[validate(custom(function = validation::validate_socket_addr))]
    pub bind_addr: String,

    /// Socket read timeout; bounds how long shutdown waits on the listener.
    #[validate(range(min = 10, max = 5000))]
    pub read_timeout_ms: u64,

    /// Receive buffer per datagram (bytes, or "32KiB"). Never smaller than
    /// the largest datagram a usage sender emits.
    #[validate(range(min = 1472, max = 65535))]
    #[serde(deserialize_with = "deserialize_size")]
    pub recv_buffer_size: usize,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:4810".into(),
            read_timeout_ms: 250,
            recv_buffer_size: 65535,
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum SizeValue {
    Num(usize),
    Str(String),
}

/// Accepts plain numbers or human-friendly sizes such as "64KiB".
fn deserialize_size<'de, D>(deserializer: D) -> Result<usize, D::Error>
where
    D: Deserializer<'de>,
{
    match SizeValue::deserialize(deserializer)? {
        SizeValue::Num(n) => Ok(n),
        SizeValue::Str(s) => parse_size(&s).map_err(serde::de::Error::custom),
    }
}

fn parse_size(s: &str) -> Result<usize, String> {
    let s = s.trim();
    let split = s
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(s.len());
    let (num_part, unit_part) = s.split_at(split);
    let number: f64 = num_part
        .parse()
        .map_err(|_| format!("Invalid size '{s}'"))?;
    let multiplier = match unit_part.trim().to_lowercase().as_str() {
        "" | "b" => 1.0,
        "kb" | "kib" => 1024.0,
        "mb" | "mib" => 1024.0 * 1024.0,
        _ => return Err(format!("Unknown size unit in '{s}'")),
    };
    Ok((number * multiplier) as usize)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn human_sizes() {
        assert_eq!(parse_size("1472").unwrap(), 1472);
        assert_eq!(parse_size("32KiB").unwrap(), 32 * 1024);
        assert_eq!(parse_size("0.5 kb").unwrap(), 512);
        assert!(parse_size("12 parsecs").is_err());
        assert!(parse_size("KiB").is_err());
    }

    #[test]
    fn default_validates() {
        ListenerConfig::default().validate().unwrap();
    }

    #[test]
    fn buffer_holds_a_full_usage_datagram() {
        let mut config = ListenerConfig {
            recv_buffer_size: 1472,
            ..ListenerConfig::default()
        };
        assert!(config.validate().is_ok());

        config.recv_buffer_size = 1471;
        assert!(config.validate().is_err());
        config.recv_buffer_size = 512;
        assert!(config.validate().is_err());
    }
}
