// SPDX-License-Identifier: MPL-2.0

//! Log output for hosts.

use tracing_subscriber::EnvFilter;

/// Installs a global subscriber that prints to stderr.
///
/// Verbosity is read from the `RUST_LOG` environment variable; with it unset, only warnings and
/// errors are shown. Per-instruction tracing is behind `r3k_cpu=trace`.
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(true)
        .with_level(true)
        // The target is mostly just noise.
        .with_target(false)
        .without_time()
        .init();
}
