//! # usagerx-storage
//!
//! Persistence sinks for decoded usage records. A sink executes one
//! `PersistenceCommand` per call and reports failure without retrying; the
//! dispatch loop decides what a failure costs.
//!
//! ### Key Submodules:
//! - `sink`: the `PersistenceSink` contract
//! - `sqlite`: SQLite-backed sink with optional table provisioning
//! - `memory`: in-process sink for tests and dry runs

pub mod error;
pub mod identifier;
pub mod memory;
pub mod sink;
pub mod sqlite;

pub use error::{PersistenceError, StorageError};
pub use identifier::{is_valid_identifier, quote_identifier};
pub use memory::MemorySink;
pub use sink::PersistenceSink;
pub use sqlite::SqliteSink;
