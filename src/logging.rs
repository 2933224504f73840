//! Tracing/logging initialization.

use tracing_subscriber::EnvFilter;

// Targets are module paths rooted at the crate name (the bin name, `sora`).
const VERBOSE_DIRECTIVE: &str = concat!(env!("CARGO_CRATE_NAME"), "=debug,info");

fn default_directive(verbose: bool) -> &'static str {
    if verbose { VERBOSE_DIRECTIVE } else { "info" }
}

/// Initialize logging to stderr. `RUST_LOG` wins over `verbose`.
///
/// Safe to call multiple times (subsequent calls are no-ops).
pub fn init(verbose: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive(verbose)));

    // stdout is reserved for JSON documents.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}
