//! `tracing` initialization.
//!
//! Verbosity is controlled two ways, both honored at once: the coarse `-v`
//! CLI flag / `VERBOSE_LOGS` env var bumps the default filter level, while
//! `RUST_LOG` (via [`tracing_subscriber::EnvFilter`]) always takes
//! precedence for anyone who wants per-module control.

use tracing_subscriber::EnvFilter;

/// Initialize the global `tracing` subscriber, writing to stderr.
///
/// `verbosity` is the `-v` flag's repeat count (0 = warn, 1 = info,
/// 2 = debug, 3+ = trace), used only as the default when `RUST_LOG` is unset.
pub fn init(verbosity: u8, verbose_logs_env: bool) {
    let default_level = match verbosity.max(u8::from(verbose_logs_env)) {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("laughter_pipeline={default_level}")));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}
