//! Logging initialization for binaries and tests.
//!
//! The crate logs through both `log` and `tracing`; the bridge forwards
//! `log` records into the tracing subscriber so one `RUST_LOG` filter
//! covers everything. Safe to call more than once.

use tracing_subscriber::EnvFilter;

pub fn init_logging() {
    // Repeat initialization (tests) leaves the existing bridge in place.
    let _ = tracing_log::LogTracer::init();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .finish();
    let _ = tracing::subscriber::set_global_default(subscriber);
}
