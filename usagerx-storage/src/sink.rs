//! ## usagerx-storage::sink
//! Write contract between the dispatch loop and the backing store.

use std::sync::Arc;

use usagerx_protocols::PersistenceCommand;

use crate::error::PersistenceError;

/// Executes one structured insert.
///
/// Implementations are shared by every consumer thread and must tolerate
/// concurrent calls. A failed write is reported, not retried.
pub trait PersistenceSink: Send + Sync {
    fn write(&self, command: &PersistenceCommand) -> Result<(), PersistenceError>;
}

impl<S: PersistenceSink + ?Sized> PersistenceSink for Arc<S> {
    fn write(&self, command: &PersistenceCommand) -> Result<(), PersistenceError> {
        (**self).write(command)
    }
}

impl<S: PersistenceSink + ?Sized> PersistenceSink for Box<S> {
    fn write(&self, command: &PersistenceCommand) -> Result<(), PersistenceError> {
        (**self).write(command)
    }
}
