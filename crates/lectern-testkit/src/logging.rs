//! Tracing output for test runs.

use tracing_subscriber::EnvFilter;

/// Route `tracing` output to the test harness, filtered by `RUST_LOG`.
///
/// Safe to call from every test; only the first call installs a
/// subscriber.
pub fn init_test_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .try_init();
}
