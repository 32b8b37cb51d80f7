//! Tracing/logging initialization.

use tracing_subscriber::EnvFilter;

/// Build the filter: `RUST_LOG` wins, then `default_filter`, then `info`.
pub fn filter(default_filter: &str) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_filter))
        .unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Initialize tracing/logging for the process.
///
/// Safe to call multiple times (subsequent calls are no-ops).
pub fn init(default_filter: &str, json: bool) {
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter(default_filter))
        .with_timer(tracing_subscriber::fmt::time::SystemTime)
        .with_target(false);

    // JSON for deployments, human-readable for local runs.
    let _ = if json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
}
