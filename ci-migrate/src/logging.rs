//! Diagnostic tracing for `ci-migrate`.
//!
//! # Separation of Concerns
//!
//! - **Tracing (this module)**: API calls and decisions via `RUST_LOG`, output
//!   to stderr.
//! - **Reports (`detect`, `update`)**: The human-readable audit and progress
//!   lines on stdout. Always written, unaffected by `RUST_LOG`.

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize tracing subscriber.
///
/// Reads `RUST_LOG` env var. Defaults to `warn` if unset.
/// Output: stderr, compact format.
///
/// # Example
/// ```bash
/// RUST_LOG=ci_migrate=debug ci-migrate detect afw
/// ```
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .init();
}
