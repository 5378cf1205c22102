//! Cooperative stop flag shared by the listener and dispatch threads.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use parking_lot::Mutex;

/// Shutdown request plus the drain deadline.
///
/// The listener stops as soon as a stop is requested. Consumers keep draining
/// until the queue is closed and empty or the deadline passes, whichever
/// comes first.
#[derive(Debug, Default)]
pub struct ShutdownSignal {
    requested: AtomicBool,
    deadline: Mutex<Option<Instant>>,
}

impl ShutdownSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request(&self) {
        self.requested.store(true, Ordering::SeqCst);
    }

    pub fn is_requested(&self) -> bool {
        self.requested.load(Ordering::SeqCst)
    }

    pub fn set_deadline(&self, deadline: Instant) {
        *self.deadline.lock() = Some(deadline);
    }

    pub fn deadline(&self) -> Option<Instant> {
        *self.deadline.lock()
    }

    /// True once a stop was requested and the drain deadline has passed.
    pub fn should_abandon(&self) -> bool {
        self.is_requested() && self.deadline().is_some_and(|d| Instant::now() >= d)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn abandon_needs_request_and_elapsed_deadline() {
        let signal = ShutdownSignal::new();
        assert!(!signal.should_abandon());

        signal.set_deadline(Instant::now());
        assert!(!signal.should_abandon());

        signal.request();
        assert!(signal.should_abandon());

        signal.set_deadline(Instant::now() + Duration::from_secs(60));
        assert!(!signal.should_abandon());
    }
}
