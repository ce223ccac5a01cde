//! Structured logging.
//!
//! # Responsibilities
//! - Initialize the tracing subscriber for host processes that want the
//!   library's default setup
//! - Honor `RUST_LOG`-style env filtering
//!
//! # Design Decisions
//! - The library itself only emits `tracing` events; installing a
//!   subscriber is the host's choice, this is a convenience

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Install a fmt subscriber with env-filter support. `default_filter` is
/// used when the environment does not set one (e.g. `callguard=debug`).
pub fn init(default_filter: &str) {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}
