//! ## usagerx-telemetry::logging
//! `tracing` subscriber setup and the periodic counter report.

use tracing::info;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::{fmt, EnvFilter};

use crate::metrics::CounterSnapshot;

/// Installs the global fmt subscriber. `RUST_LOG` overrides `level`.
///
/// Returns `false` if a global subscriber was already set.
pub fn init(level: &str) -> bool {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    fmt()
        .with_env_filter(filter)
        .with_thread_names(true)
        .with_span_events(FmtSpan::CLOSE)
        .try_init()
        .is_ok()
}

/// Emits one `info!` line carrying every counter.
pub fn report(snapshot: &CounterSnapshot) {
    info!(
        received = snapshot.received,
        persisted = snapshot.persisted,
        dropped_full_queue = snapshot.dropped_full_queue,
        dropped_unroutable = snapshot.dropped_unroutable,
        dropped_malformed = snapshot.dropped_malformed,
        dropped_schema_mismatch = snapshot.dropped_schema_mismatch,
        dropped_persist_failure = snapshot.dropped_persist_failure,
        queue_depth = snapshot.queue_depth,
        "Receiver counters"
    );
}
