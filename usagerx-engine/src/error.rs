use std::net::SocketAddr;

use thiserror::Error;
use usagerx_core::QueueError;
use usagerx_protocols::EncodeError;
use usagerx_storage::StorageError;

/// Startup and lifecycle failures of the receiver.
#[derive(Debug, Error)]
pub enum ReceiverError {
    #[error("Cannot bind usage listener on '{addr}': {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Socket setup failed: {0}")]
    Socket(#[source] std::io::Error),

    #[error("Queue error: {0}")]
    Queue(#[from] QueueError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Failed to spawn thread '{name}': {source}")]
    Spawn {
        name: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Thread '{0}' panicked")]
    ThreadPanicked(String),
}

#[derive(Debug, Error)]
pub enum SenderError {
    #[error("No usage targets configured")]
    NoTargets,

    #[error("Cannot resolve usage target '{target}': {source}")]
    Resolve {
        target: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Encoding failed: {0}")]
    Encode(#[from] EncodeError),

    #[error("Send to {target} failed: {source}")]
    Send {
        target: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
