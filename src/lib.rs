//! callguard: service-to-service call protection.
//!
//! Two pipelines, one crate:
//!
//! ```text
//!  outbound                                       inbound
//!  ────────                                       ───────
//!  caller                                         bearer token
//!    │                                              │
//!    ▼                                              ▼
//!  transport ─▶ circuit breaker ─▶ retry ─▶      parse ─▶ revocation ─▶ key
//!  (per-dest    rate limiter ─▶ HTTP call        check     check        lookup
//!   client)                                                              │
//!    │                                              signature ◀──────────┘
//!    ▼                                              expiry / issuer
//!  ServiceResponse | CallError                      Claims | VerifyError
//! ```
//!
//! The verification side leans on the outbound side: the key ring is kept
//! fresh by fetching the identity authority's JWKS document through the
//! same resilient transport every other destination uses.

// Core pipelines
pub mod resilience;
pub mod transport;

pub mod jwks;
pub mod revocation;
pub mod token;

// Cross-cutting concerns
pub mod config;
pub mod lifecycle;
pub mod observability;

pub use config::CallGuardConfig;
pub use jwks::{KeyFetcher, KeyRing};
pub use lifecycle::Shutdown;
pub use resilience::CallError;
pub use revocation::{InMemoryRevocationStore, RevocationChecker, RevocationStore};
pub use token::{Claims, TokenVerifier, VerifyError};
pub use transport::{ResilientTransport, ServiceResponse};
