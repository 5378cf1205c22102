//! Error types for sink construction and the write path.

use std::path::PathBuf;

use thiserror::Error;

/// Construction and maintenance failures. Opening the store is startup-fatal.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Failed to open database '{path}': {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },

    #[error("Invalid SQL identifier '{0}'")]
    InvalidIdentifier(String),

    #[error("Failed to provision table '{table}': {source}")]
    Provision {
        table: String,
        #[source]
        source: rusqlite::Error,
    },

    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

/// A single write that did not land. Never fatal to the receiver.
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("Invalid SQL identifier '{0}'")]
    InvalidIdentifier(String),

    #[error("Insert into '{0}' has no bindings")]
    EmptyCommand(String),

    #[error("Insert into '{table}' failed: {source}")]
    Write {
        table: String,
        #[source]
        source: rusqlite::Error,
    },

    #[error("Insert into '{table}' rejected: {reason}")]
    Rejected { table: String, reason: String },
}
