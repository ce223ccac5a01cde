//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → logging.rs (structured tracing events)
//!     → metrics.rs (counters via the metrics facade)
//!
//! Consumers:
//!     → whatever subscriber/recorder the host process installs
//! ```
//!
//! # Design Decisions
//! - The library never installs a subscriber or recorder on its own
//! - Metric updates are cheap counter increments

pub mod logging;
pub mod metrics;
