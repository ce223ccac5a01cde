//! Trusted verification key ring.
//!
//! # Responsibilities
//! - Hold the currently trusted verification keys, indexed by key id
//! - Serve wait-free lookups to concurrent verifiers
//! - Swap the entire key set atomically on refresh
//!
//! # Design Decisions
//! - Whole-snapshot replacement, never a merge: a reader sees either the
//!   old generation or the new one, never a mix
//! - `lookup` never blocks and never fetches; escalation on a miss is the
//!   verifier's responsibility

use std::collections::HashMap;
use std::sync::Arc;
use std::time::SystemTime;

use arc_swap::ArcSwap;
use jsonwebtoken::{Algorithm, DecodingKey};

/// One trusted public verification key. Immutable once created; superseded
/// wholesale on the next ring replacement.
pub struct VerificationKey {
    /// Key id (`kid`) the token header refers to.
    pub key_id: String,
    /// Algorithm the key set declared for this key.
    pub algorithm: Algorithm,
    /// Decoded public key material.
    pub decoding_key: DecodingKey,
}

impl std::fmt::Debug for VerificationKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VerificationKey")
            .field("key_id", &self.key_id)
            .field("algorithm", &self.algorithm)
            .finish()
    }
}

struct Snapshot {
    keys: HashMap<String, Arc<VerificationKey>>,
    fetched_at: Option<SystemTime>,
}

/// Atomically replaceable set of trusted keys.
pub struct KeyRing {
    snapshot: ArcSwap<Snapshot>,
}

impl KeyRing {
    /// An empty ring; every lookup misses until the first `replace`.
    pub fn new() -> Self {
        Self {
            snapshot: ArcSwap::from_pointee(Snapshot {
                keys: HashMap::new(),
                fetched_at: None,
            }),
        }
    }

    /// Look up a key by id. Never blocks, never triggers a fetch.
    pub fn lookup(&self, key_id: &str) -> Option<Arc<VerificationKey>> {
        self.snapshot.load().keys.get(key_id).cloned()
    }

    /// Atomically replace the whole ring with a new generation. Concurrent
    /// replacements race last-writer-wins; generations are never merged.
    pub fn replace(&self, keys: Vec<VerificationKey>) {
        let keys: HashMap<String, Arc<VerificationKey>> = keys
            .into_iter()
            .map(|key| (key.key_id.clone(), Arc::new(key)))
            .collect();
        self.snapshot.store(Arc::new(Snapshot {
            keys,
            fetched_at: Some(SystemTime::now()),
        }));
    }

    /// Number of keys in the current generation.
    pub fn len(&self) -> usize {
        self.snapshot.load().keys.len()
    }

    /// Whether the current generation holds no keys.
    pub fn is_empty(&self) -> bool {
        self.snapshot.load().keys.is_empty()
    }

    /// When the current generation was installed, if a fetch ever succeeded.
    pub fn fetched_at(&self) -> Option<SystemTime> {
        self.snapshot.load().fetched_at
    }
}

impl Default for KeyRing {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for KeyRing {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyRing").field("keys", &self.len()).finish()
    }
}
