//! Tracing subscriber setup for binaries and demos.
//!
//! The library itself only emits `tracing` events; installing a subscriber
//! is the caller's choice.

use tracing_subscriber::EnvFilter;

/// Map a `-v` count to a default filter directive.
pub fn default_directive(verbosity: u8) -> &'static str {
    match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    }
}

/// Install a formatted subscriber.
///
/// `RUST_LOG` wins when set; otherwise the filter comes from `verbosity`.
/// Installing twice is harmless: the second call is ignored.
pub fn init_tracing(verbosity: u8) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive(verbosity)));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}
