//! Decode, handler and encode error types.

use thiserror::Error;

/// Reasons a packet's bytes cannot be decoded.
///
/// Every variant is a malformed-packet condition: the packet is discarded and
/// counted, never retried.
#[derive(Clone, Debug, PartialEq, Error)]
pub enum DecodeError {
    #[error("Truncated packet: needed {needed} bytes, {available} available")]
    Truncated { needed: usize, available: usize },
    #[error("Field '{field}' out of range: {reason}")]
    OutOfRange { field: &'static str, reason: String },
    #[error("Field '{field}' is not valid UTF-8")]
    InvalidUtf8 { field: &'static str },
    #[error("Required field '{0}' missing")]
    MissingField(&'static str),
    #[error("Malformed key/value token '{0}'")]
    MalformedToken(String),
}

impl DecodeError {
    pub(crate) fn out_of_range(field: &'static str, reason: impl Into<String>) -> Self {
        DecodeError::OutOfRange {
            field,
            reason: reason.into(),
        }
    }
}

/// Errors raised by a `PacketHandler`.
#[derive(Clone, Debug, PartialEq, Error)]
pub enum HandlerError {
    #[error("Malformed packet: {0}")]
    Malformed(#[from] DecodeError),
    /// A handler was asked to build a command for a record it did not decode.
    #[error("Schema mismatch: handler '{handler}' cannot persist a '{found}' record")]
    SchemaMismatch {
        handler: &'static str,
        found: &'static str,
    },
}

/// Errors raised while building an outgoing usage packet.
#[derive(Clone, Debug, PartialEq, Error)]
pub enum EncodeError {
    #[error("Encoded packet is {len} bytes, limit is {max}")]
    TooLarge { len: usize, max: usize },
    #[error("Invalid parameter key '{0}'")]
    InvalidKey(String),
    #[error("Invalid value for parameter '{0}'")]
    InvalidValue(String),
}
