//! Rate limit tiers.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

use crate::error::{LexwareError, Result};

/// Default connection tier rate (requests per second).
pub const DEFAULT_CONNECTION_RATE: f64 = 2.0;
/// Default connection tier burst.
pub const DEFAULT_CONNECTION_BURST: u32 = 5;
/// Default client tier rate (requests per second).
pub const DEFAULT_CLIENT_RATE: f64 = 5.0;
/// Default client tier burst.
pub const DEFAULT_CLIENT_BURST: u32 = 5;
/// Slowest accepted refill rate: one request per day.
pub const MIN_RATE_PER_SECOND: f64 = 1.0 / 86_400.0;
/// Upper bound on snapshot TTLs.
pub const MAX_SNAPSHOT_TTL: Duration = Duration::from_secs(366 * 86_400);

/// The quota axis a bucket belongs to.
///
/// Tiers are evaluated in declaration order: the connection tier is checked
/// before the client tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LimitType {
    /// Per-connection (organization) quota
    Connection,
    /// Per-client (application) quota
    Client,
}

impl LimitType {
    /// Name used in bucket keys and reports.
    pub fn as_str(&self) -> &'static str {
        match self {
            LimitType::Connection => "connection",
            LimitType::Client => "client",
        }
    }
}

impl fmt::Display for LimitType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Static configuration of one token bucket quota.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RateLimitTier {
    /// Tokens added per elapsed second
    pub rate_per_second: f64,
    /// Maximum number of tokens the bucket holds
    pub burst_size: u32,
}

impl RateLimitTier {
    /// Create a new tier.
    pub fn new(rate_per_second: f64, burst_size: u32) -> Self {
        Self {
            rate_per_second,
            burst_size,
        }
    }

    /// The default connection tier (2 req/s, burst 5).
    pub fn connection_default() -> Self {
        Self::new(DEFAULT_CONNECTION_RATE, DEFAULT_CONNECTION_BURST)
    }

    /// The default client tier (5 req/s, burst 5).
    pub fn client_default() -> Self {
        Self::new(DEFAULT_CLIENT_RATE, DEFAULT_CLIENT_BURST)
    }

    /// Burst size as a token count.
    pub fn capacity(&self) -> f64 {
        f64::from(self.burst_size)
    }

    /// Time for an empty bucket to refill completely, rounded up to whole seconds.
    pub fn full_refill_time(&self) -> Duration {
        // Float to int casts saturate, so tiny rates yield u64::MAX rather than wrapping
        let secs = (self.capacity() / self.rate_per_second).ceil() as u64;
        Duration::from_secs(secs.max(1))
    }

    /// Store TTL for snapshots of this tier.
    ///
    /// Always at least `multiplier` seconds, and never shorter than the time a
    /// bucket needs to refill, so an evicted snapshot is indistinguishable
    /// from a full bucket. Capped at [`MAX_SNAPSHOT_TTL`].
    pub fn snapshot_ttl(&self, multiplier: u32) -> Duration {
        let secs = self
            .full_refill_time()
            .as_secs()
            .saturating_mul(u64::from(multiplier.max(1)));
        Duration::from_secs(secs).min(MAX_SNAPSHOT_TTL)
    }

    /// Check that the tier describes a usable bucket.
    pub fn validate(&self, limit_type: LimitType) -> Result<()> {
        if !self.rate_per_second.is_finite() || self.rate_per_second < MIN_RATE_PER_SECOND {
            return Err(LexwareError::Config(format!(
                "{} tier rate_per_second must be a number of at least {} (one per day), got {}",
                limit_type, MIN_RATE_PER_SECOND, self.rate_per_second
            )));
        }
        if self.burst_size == 0 {
            return Err(LexwareError::Config(format!(
                "{} tier burst_size must be at least 1",
                limit_type
            )));
        }
        Ok(())
    }
}
