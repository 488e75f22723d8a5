//! Token bucket refill and consumption.
//!
//! Refill is lazy: nothing ticks in the background, the token count is
//! recomputed from the elapsed time whenever a bucket is observed. Elapsed
//! time is measured in whole seconds, so sub-second bursts beyond the
//! configured rate are slightly under-penalized.

use crate::store::BucketSnapshot;

use super::tier::RateLimitTier;

/// A bucket brought up to date with the current time.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TokenBucket {
    tokens: f64,
    last_refill: i64,
    tier: RateLimitTier,
}

impl TokenBucket {
    /// A full bucket observed for the first time at `now`.
    pub fn full(tier: RateLimitTier, now: i64) -> Self {
        Self {
            tokens: tier.capacity(),
            last_refill: now,
            tier,
        }
    }

    /// Restore a bucket from its stored snapshot (or start full) and refill it to `now`.
    pub fn observe(snapshot: Option<BucketSnapshot>, tier: RateLimitTier, now: i64) -> Self {
        let mut bucket = match snapshot {
            Some(snapshot) => Self {
                tokens: snapshot.tokens,
                last_refill: snapshot.last_refill,
                tier,
            },
            None => Self::full(tier, now),
        };
        bucket.refill(now);
        bucket
    }

    /// An empty bucket observed at `now`.
    pub fn empty(tier: RateLimitTier, now: i64) -> Self {
        Self {
            tokens: 0.0,
            last_refill: now,
            tier,
        }
    }

    /// Add the tokens accrued since the last refill, capped at the burst size.
    fn refill(&mut self, now: i64) {
        // A clock stepping backwards adds nothing
        let elapsed = now.saturating_sub(self.last_refill).max(0);
        let added = elapsed as f64 * self.tier.rate_per_second;
        self.tokens = (self.tokens + added).clamp(0.0, self.tier.capacity());
        self.last_refill = now;
    }

    /// Whether at least one whole token is available.
    pub fn is_allowed(&self) -> bool {
        self.tokens >= 1.0
    }

    /// Seconds until one whole token is available, rounded up. Zero when allowed.
    pub fn wait_time(&self) -> u64 {
        if self.is_allowed() {
            return 0;
        }
        ((1.0 - self.tokens) / self.tier.rate_per_second).ceil() as u64
    }

    /// Take one token, never going below zero.
    pub fn consume(&mut self) {
        self.tokens = (self.tokens - 1.0).max(0.0);
    }

    /// Current token count.
    pub fn tokens(&self) -> f64 {
        self.tokens
    }

    /// Timestamp of the last refill.
    pub fn last_refill(&self) -> i64 {
        self.last_refill
    }

    /// Snapshot to persist.
    pub fn snapshot(&self) -> BucketSnapshot {
        BucketSnapshot::new(self.tokens, self.last_refill)
    }
}
