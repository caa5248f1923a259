//! Subscriber setup for the binary

use tracing_subscriber::EnvFilter;

/// Env var consulted before `RUST_LOG`
pub const LOG_ENV: &str = "RELAY_LOG";

/// Build the filter from `RELAY_LOG`, then `RUST_LOG`, then `fallback`
#[must_use]
pub fn filter(fallback: &str) -> EnvFilter {
    EnvFilter::try_from_env(LOG_ENV)
        .or_else(|_| EnvFilter::try_from_default_env())
        .or_else(|_| EnvFilter::try_new(fallback))
        .unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Install the global subscriber; later calls are ignored
pub fn init(fallback: &str, json: bool) {
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter(fallback))
        .with_target(true)
        .with_writer(std::io::stderr);

    let _ = if json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
}
