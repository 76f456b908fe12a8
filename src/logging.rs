//! Tracing subscriber setup.
//!
//! `RUST_LOG` controls the filter; without it the binary logs at `info`
//! with noisy HTTP and SQL internals held at `warn`.

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const DEFAULT_FILTER: &str = "info,sqlx=warn,hyper=warn,reqwest=warn";

/// Install the global subscriber. Safe to call more than once; later calls
/// are ignored.
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    let fmt_layer = fmt::layer().with_target(true).with_writer(std::io::stderr);

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .try_init();
}
