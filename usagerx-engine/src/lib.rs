//! # usagerx-engine
//!
//! Runtime of the usage receiver: a UDP listener thread feeding a bounded
//! queue, a pool of dispatch threads routing each packet to its handler and
//! the persistence sink, and the lifecycle that starts and drains them.

pub mod dead_letter;
pub mod dispatch;
pub mod error;
pub mod listener;
pub mod receiver;
pub mod registry;
pub mod sender;
pub mod shutdown;

pub use dead_letter::DeadLetter;
pub use dispatch::{DispatchOutcome, Dispatcher};
pub use error::{ReceiverError, SenderError};
pub use listener::UdpListener;
pub use receiver::{ReceiverState, UsageReceiver};
pub use registry::HandlerRegistry;
pub use sender::UsageSender;
pub use shutdown::ShutdownSignal;

pub mod prelude {
    pub use super::{
        DispatchOutcome, Dispatcher, HandlerRegistry, ReceiverError, ReceiverState,
        ShutdownSignal, UsageReceiver,
    };
}
