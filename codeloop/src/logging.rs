//! Diagnostic tracing for the workflow.
//!
//! - **Tracing (this module)**: step-by-step diagnostics via `RUST_LOG`, written
//!   to stderr so stdout stays reserved for the JSON result.
//! - **Run log (`io/run_log`)**: per-step state snapshots, written only when
//!   `run_log_dir` is configured and unaffected by `RUST_LOG`.

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize the tracing subscriber.
///
/// Reads `RUST_LOG`, defaulting to `warn`. Output: stderr, compact format.
///
/// # Example
/// ```bash
/// RUST_LOG=codeloop=debug codeloop run "calculator supporting add"
/// ```
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .init();
}
