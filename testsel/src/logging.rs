//! Diagnostic tracing for the selector.
//!
//! Selection output goes to stdout for the harness; tracing goes to stderr so
//! the two never mix.

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize the tracing subscriber.
///
/// Reads `RUST_LOG`. Defaults to `warn` so fallbacks and stale-graph
/// widening are visible without extra flags.
///
/// # Example
/// ```bash
/// RUST_LOG=testsel=debug testsel select --base origin/main
/// ```
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .init();
}
