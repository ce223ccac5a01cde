//! Verification key management.
//!
//! # Data Flow
//! ```text
//! identity authority (GET {authority}{jwks_path})
//!     → fetcher.rs (resilient fetch, envelope unwrap, RSA filter)
//!     → key_ring.rs (atomic whole-snapshot replace)
//!     → token::verifier (wait-free lookup per verification)
//!
//! On lookup miss:
//!     verifier triggers one synchronous refresh and retries once
//! On refresh failure:
//!     previous ring keeps serving (stale keys beat no keys)
//! ```

pub mod fetcher;
pub mod key_ring;

pub use fetcher::{FetchError, KeyFetcher, IDENTITY_SERVICE};
pub use key_ring::{KeyRing, VerificationKey};
