//! ## usagerx-storage::memory
//! Sink that keeps every accepted command in memory.

use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;

use usagerx_protocols::PersistenceCommand;

use crate::error::PersistenceError;
use crate::identifier::is_valid_identifier;
use crate::sink::PersistenceSink;

#[derive(Debug, Default)]
pub struct MemorySink {
    rows: Mutex<Vec<PersistenceCommand>>,
    reject: AtomicBool,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// While set, every write fails with `PersistenceError::Rejected`.
    pub fn set_reject(&self, reject: bool) {
        self.reject.store(reject, Ordering::SeqCst);
    }

    pub fn rows(&self) -> Vec<PersistenceCommand> {
        self.rows.lock().clone()
    }

    pub fn rows_for(&self, table: &str) -> Vec<PersistenceCommand> {
        self.rows
            .lock()
            .iter()
            .filter(|cmd| cmd.table() == table)
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.rows.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.lock().is_empty()
    }
}

impl PersistenceSink for MemorySink {
    fn write(&self, command: &PersistenceCommand) -> Result<(), PersistenceError> {
        if !is_valid_identifier(command.table()) {
            return Err(PersistenceError::InvalidIdentifier(
                command.table().to_string(),
            ));
        }
        if command.is_empty() {
            return Err(PersistenceError::EmptyCommand(command.table().to_string()));
        }
        if self.reject.load(Ordering::SeqCst) {
            return Err(PersistenceError::Rejected {
                table: command.table().to_string(),
                reason: "sink is rejecting writes".into(),
            });
        }
        self.rows.lock().push(command.clone());
        Ok(())
    }
}
