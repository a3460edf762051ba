//! Structured logging setup.
//!
//! Log level is read from `RUST_LOG` and defaults to `info`. Both functions
//! leave an already installed subscriber in place.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Human-readable output for development.
///
/// ```no_run
/// provenance::logging::init();
/// tracing::info!("provenance service starting");
/// ```
pub fn init() {
    let _ = tracing_subscriber::registry()
        .with(env_filter())
        .with(fmt::layer().with_target(true))
        .try_init();
}

/// JSON output for log aggregation.
pub fn init_json() {
    let _ = tracing_subscriber::registry()
        .with(env_filter())
        .with(fmt::layer().json().with_target(true).with_thread_ids(true))
        .try_init();
}
