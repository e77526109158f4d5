//! Tracing subscriber installation.

use crate::defaults;
use tracing_subscriber::EnvFilter;

/// Install a fmt subscriber filtered by `RUST_LOG`, or by `fallback` when the
/// variable is unset or invalid.
///
/// Safe to call more than once: returns `false` when a global subscriber was
/// already installed (e.g. by the embedding application or a previous test).
pub fn init(fallback: Option<&str>) -> bool {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(fallback.unwrap_or(defaults::LOG_FILTER)));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init()
        .is_ok()
}
