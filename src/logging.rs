//! Tracing subscriber setup for the binary

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Initialize the global tracing subscriber.
///
/// `RUST_LOG` takes precedence; otherwise the crate logs at `info`, or `debug` when verbose.
/// Logs go to stderr so the run summary on stdout stays clean.
pub fn init_logging(verbose: bool, json: bool) {
    let default_directive = if verbose { "careforge=debug" } else { "careforge=info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive));

    let registry = tracing_subscriber::registry().with(filter);
    let result = if json {
        registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .try_init()
    } else {
        registry
            .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
            .try_init()
    };

    // Already initialized (e.g. by a test harness)
    let _ = result;
}
