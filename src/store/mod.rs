//! Shared state store abstraction.
//!
//! The limiter owns no bucket state itself. Every bucket lives in a
//! [`StateStore`] under a deterministic key, so any number of limiter
//! instances (threads, processes, hosts) pointing at the same store share
//! the same quotas.

mod memory;

pub use memory::MemoryStore;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Errors raised by a store backend.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The backend could not be reached or refused the operation
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Persisted state of one token bucket.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BucketSnapshot {
    /// Available tokens, possibly fractional
    pub tokens: f64,
    /// Unix timestamp (seconds) of the last refill computation
    pub last_refill: i64,
}

impl BucketSnapshot {
    /// Create a new snapshot.
    pub fn new(tokens: f64, last_refill: i64) -> Self {
        Self {
            tokens,
            last_refill,
        }
    }
}

/// Key-value store with per-key TTL holding bucket snapshots.
///
/// Only `get` and `put` are required. `update` performs the read-modify-write
/// used when committing a hit; the default implementation is a plain
/// get-then-put and is NOT atomic against concurrent writers of the same key,
/// so concurrent commits from several processes may over-consume tokens.
/// Backends able to evaluate the update atomically (compare-and-swap, a
/// server-side script, a held lock) should override it.
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Fetch the snapshot stored under `key`, if any and not expired.
    async fn get(&self, key: &str) -> Result<Option<BucketSnapshot>, StoreError>;

    /// Store `snapshot` under `key`, expiring after `ttl`.
    async fn put(&self, key: &str, snapshot: BucketSnapshot, ttl: Duration)
        -> Result<(), StoreError>;

    /// Replace the snapshot under `key` with `f(current)` and return the new value.
    async fn update(
        &self,
        key: &str,
        ttl: Duration,
        f: &(dyn Fn(Option<BucketSnapshot>) -> BucketSnapshot + Send + Sync),
    ) -> Result<BucketSnapshot, StoreError> {
        let current = self.get(key).await?;
        let next = f(current);
        self.put(key, next, ttl).await?;
        Ok(next)
    }
}
