//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup:
//!     load config → build transport → KeyFetcher::start (initial refresh,
//!     then periodic task) → verifier ready
//!
//! Shutdown:
//!     Shutdown::trigger → refresh task exits its loop
//! ```

pub mod shutdown;

pub use shutdown::Shutdown;
