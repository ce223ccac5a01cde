//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → CallGuardConfig (validated, immutable)
//!     → shared via Arc to transport / fetcher / verifier
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; changes require a restart
//! - All fields have defaults so a minimal (or empty) config works
//! - Validation separates syntactic (serde) from semantic checks
//! - Per-destination overrides merge over the defaults at resolve time

pub mod loader;
pub mod schema;
pub mod validation;

pub use schema::CallGuardConfig;
pub use schema::CircuitBreakerConfig;
pub use schema::JwksConfig;
pub use schema::RateLimiterConfig;
pub use schema::RetryConfig;
pub use schema::ServiceOverrides;
pub use schema::ServicePolicy;
pub use schema::TimeoutConfig;
