//! Tracing subscriber setup.

use tracing_subscriber::EnvFilter;

/// Initializes a global tracing subscriber with env-filter support.
///
/// Reads `RUST_LOG` if set, otherwise defaults to `info`. Safe to call more
/// than once; later calls are no-ops.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

/// Initializes a global tracing subscriber with JSON output.
///
/// Intended for service deployments where logs are shipped to a collector.
pub fn init_json_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .json()
        .with_env_filter(filter)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_is_idempotent() {
        init_tracing();
        init_tracing();
        // Second call must not panic.
    }
}
