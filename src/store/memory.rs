//! In-process store backed by a concurrent hash map.

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::time::{Duration, Instant};
use tracing::trace;

use super::{BucketSnapshot, StateStore, StoreError};

/// How often writes sweep expired entries out of the map.
const DEFAULT_PURGE_INTERVAL: Duration = Duration::from_secs(60);

struct StoredBucket {
    snapshot: BucketSnapshot,
    /// `None` when the TTL reaches past what `Instant` can represent
    expires_at: Option<Instant>,
}

impl StoredBucket {
    fn new(snapshot: BucketSnapshot, now: Instant, ttl: Duration) -> Self {
        Self {
            snapshot,
            expires_at: now.checked_add(ttl),
        }
    }

    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.map_or(true, |expires_at| expires_at > now)
    }
}

/// A [`StateStore`] living in the current process.
///
/// Expired entries read as absent and are dropped lazily on access, plus a
/// periodic sweep piggybacked on writes. `update` holds the shard lock for
/// the key across the read-modify-write, so commits from tasks sharing one
/// `MemoryStore` never race.
pub struct MemoryStore {
    entries: DashMap<String, StoredBucket>,
    purge_interval: Duration,
    last_purge: Mutex<Instant>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::with_purge_interval(DEFAULT_PURGE_INTERVAL)
    }

    /// Create an empty store sweeping expired entries at most once per `interval`.
    pub fn with_purge_interval(interval: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            purge_interval: interval,
            last_purge: Mutex::new(Instant::now()),
        }
    }

    /// Drop every expired entry. Returns the number removed.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, stored| stored.is_live(now));
        *self.last_purge.lock() = now;
        let removed = before.saturating_sub(self.entries.len());
        if removed > 0 {
            trace!(removed, "Purged expired buckets");
        }
        removed
    }

    /// Number of entries currently held, including not yet purged expired ones.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the store holds no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Remove all entries.
    pub fn clear(&self) {
        self.entries.clear();
    }

    fn maybe_purge(&self) {
        let due = {
            let last = self.last_purge.lock();
            last.elapsed() >= self.purge_interval
        };
        if due {
            self.purge_expired();
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StateStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<BucketSnapshot>, StoreError> {
        let now = Instant::now();
        let expired = match self.entries.get(key) {
            Some(stored) if stored.is_live(now) => return Ok(Some(stored.snapshot)),
            Some(_) => true,
            None => false,
        };

        if expired {
            self.entries.remove_if(key, |_, stored| !stored.is_live(now));
        }
        Ok(None)
    }

    async fn put(
        &self,
        key: &str,
        snapshot: BucketSnapshot,
        ttl: Duration,
    ) -> Result<(), StoreError> {
        self.entries.insert(
            key.to_string(),
            StoredBucket::new(snapshot, Instant::now(), ttl),
        );
        self.maybe_purge();
        Ok(())
    }

    async fn update(
        &self,
        key: &str,
        ttl: Duration,
        f: &(dyn Fn(Option<BucketSnapshot>) -> BucketSnapshot + Send + Sync),
    ) -> Result<BucketSnapshot, StoreError> {
        let now = Instant::now();
        let next = match self.entries.entry(key.to_string()) {
            Entry::Occupied(mut occupied) => {
                let current = Some(occupied.get())
                    .filter(|stored| stored.is_live(now))
                    .map(|stored| stored.snapshot);
                let next = f(current);
                occupied.insert(StoredBucket::new(next, now, ttl));
                next
            }
            Entry::Vacant(vacant) => {
                let next = f(None);
                vacant.insert(StoredBucket::new(next, now, ttl));
                next
            }
        };
        self.maybe_purge();
        Ok(next)
    }
}
