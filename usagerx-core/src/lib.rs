//! # usagerx-core
//!
//! Foundation layer shared by the usage receiver: the raw packet type handed
//! from the network listener to the dispatch loop, and the bounded queue that
//! sits between them.
//!
//! ### Key Submodules:
//! - `packet`: immutable datagram bytes plus arrival metadata
//! - `ring_buffer`: fixed-capacity FIFO with drop-on-full insert and a
//!   condvar-backed blocking dequeue

pub mod error;
pub mod packet;
pub mod ring_buffer;

pub mod prelude {
    pub use crate::error::*;
    pub use crate::packet::*;
    pub use crate::ring_buffer::*;
}

pub use error::QueueError;
pub use packet::RawPacket;
pub use ring_buffer::RingBuffer;
