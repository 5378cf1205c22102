use thiserror::Error;

/// Queue construction errors.
///
/// A full queue is not an error: `RingBuffer::insert` reports it by returning
/// `false`.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum QueueError {
    #[error("Invalid capacity {0} (must be greater than zero)")]
    InvalidCapacity(usize),
}
