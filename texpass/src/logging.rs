//! Tracing setup for the build driver.
//!
//! Tracing carries developer diagnostics (process spawn/exit, ignored exit
//! codes, resolved plans) on stderr. The `> Task :name` framing printed by the
//! binary is product output and does not go through here.

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Default filter directive for a `-v` count, used when `RUST_LOG` is unset.
pub fn default_directive(verbosity: u8) -> &'static str {
    match verbosity {
        0 => "warn",
        1 => "warn,texpass=info",
        _ => "warn,texpass=debug",
    }
}

/// Install the global subscriber: `RUST_LOG` if set, otherwise
/// [`default_directive`]. Compact format on stderr.
///
/// # Example
/// ```bash
/// RUST_LOG=texpass=debug texpass run build
/// ```
pub fn init(verbosity: u8) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive(verbosity)));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .init();
}
