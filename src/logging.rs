//! Logging and tracing initialization.
//!
//! Call one of these once at startup, before building the router, to see
//! request-error logs and (in debug mode) per-dispatch traces. The level is
//! controlled by the `RUST_LOG` environment variable:
//!
//! ```bash
//! # Show chain traces from debug-mode routers
//! RUST_LOG=debug cargo run
//!
//! # Production: warnings and errors only
//! RUST_LOG=warn cargo run
//! ```

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initialize logging with sensible defaults (`info` unless `RUST_LOG` says
/// otherwise).
///
/// # Panics
///
/// Panics if a global subscriber was already installed. Call once.
pub fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Initialize logging with a programmatic level instead of `RUST_LOG`.
///
/// # Panics
///
/// Panics if a global subscriber was already installed. Call once.
pub fn init_logging_with_level(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}
