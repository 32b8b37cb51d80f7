//! Tracing and logging setup shared by the binaries.

/// Tracing configuration (filters, layers).
pub mod tracing;

/// Initialize process-wide logging.
///
/// `default_filter` applies when `RUST_LOG` is unset. Safe to call multiple
/// times; subsequent calls are no-ops.
pub fn init(default_filter: &str, json: bool) {
    tracing::init(default_filter, json);
}
