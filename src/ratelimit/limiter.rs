//! Two-tier token bucket rate limiter.

use rand::Rng;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, trace, warn};

use crate::config::{RateLimitingConfig, StoreFailurePolicy, DEFAULT_KEY_PREFIX};
use crate::error::{LexwareError, Result};
use crate::store::StateStore;

use super::bucket::TokenBucket;
use super::clock::{Clock, SystemClock};
use super::endpoint::BucketKey;
use super::tier::{LimitType, RateLimitTier};

/// Tiers in evaluation order.
const TIERS: [LimitType; 2] = [LimitType::Connection, LimitType::Client];

/// Upper bound of the random delay added to each backoff.
const MAX_BACKOFF_JITTER_MS: u64 = 250;

/// Default snapshot TTL multiplier.
const DEFAULT_TTL_MULTIPLIER: u32 = 60;

/// Outcome of a rate limit check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Decision {
    /// Whether the request may proceed now
    pub allowed: bool,
    /// Minimum seconds to wait before retrying; zero when allowed
    pub wait_time: u64,
    /// The tier that denied the request
    pub limit_type: Option<LimitType>,
}

impl Decision {
    fn allow() -> Self {
        Self {
            allowed: true,
            wait_time: 0,
            limit_type: None,
        }
    }

    fn deny(limit_type: LimitType, wait_time: u64) -> Self {
        Self {
            allowed: false,
            wait_time,
            limit_type: Some(limit_type),
        }
    }

    /// Turn a denial into [`LexwareError::RateLimited`].
    pub fn into_result(self) -> Result<()> {
        match self.limit_type {
            Some(limit_type) if !self.allowed => Err(LexwareError::RateLimited {
                wait_time: self.wait_time,
                limit_type,
            }),
            _ => Ok(()),
        }
    }
}

/// Diagnostic view of one tier's bucket.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TierStatus {
    /// Tokens currently available (refilled, not persisted)
    pub tokens: f64,
    /// Configured refill rate in requests per second
    pub limit: f64,
    /// Configured burst size
    pub burst: u32,
    /// Store key of the bucket
    pub key: String,
}

/// Diagnostic view of both tiers for one endpoint.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LimiterStatus {
    /// Per-connection bucket
    pub connection: TierStatus,
    /// Per-client bucket
    pub client: TierStatus,
}

/// Client-side rate limiter guarding calls to the Lexware Office API.
///
/// Every request is checked against two independent token buckets: one per
/// connection (organization) and one per client (application), both keyed by
/// the normalized endpoint. Bucket state lives in the injected
/// [`StateStore`]; the limiter itself is stateless between calls.
///
/// Checking ([`is_allowed`](Self::is_allowed)) and committing
/// ([`record_hit`](Self::record_hit)) are separate steps. Unless the store
/// overrides [`StateStore::update`] with an atomic implementation, concurrent
/// commits against the same bucket from several processes can over-consume
/// tokens; the guarantee is optimistic, not strict.
pub struct LexwareRateLimiter {
    connection_id: String,
    client_id: String,
    key_prefix: String,
    connection: RateLimitTier,
    client: RateLimitTier,
    ttl_multiplier: u32,
    failure_policy: StoreFailurePolicy,
    store: Arc<dyn StateStore>,
    clock: Arc<dyn Clock>,
}

impl LexwareRateLimiter {
    /// Create a limiter with the default tiers and key prefix.
    pub fn new(
        connection_id: impl Into<String>,
        client_id: impl Into<String>,
        store: Arc<dyn StateStore>,
    ) -> Self {
        let limiter = Self {
            connection_id: connection_id.into(),
            client_id: client_id.into(),
            key_prefix: DEFAULT_KEY_PREFIX.to_string(),
            connection: RateLimitTier::connection_default(),
            client: RateLimitTier::client_default(),
            ttl_multiplier: DEFAULT_TTL_MULTIPLIER,
            failure_policy: StoreFailurePolicy::default(),
            store,
            clock: Arc::new(SystemClock),
        };
        info!(
            connection_id = %limiter.connection_id,
            client_id = %limiter.client_id,
            "Rate limiter initialized"
        );
        limiter
    }

    /// Create a limiter from validated configuration.
    pub fn from_config(
        connection_id: impl Into<String>,
        client_id: impl Into<String>,
        store: Arc<dyn StateStore>,
        config: &RateLimitingConfig,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self::new(connection_id, client_id, store)
            .with_key_prefix(config.key_prefix.clone())
            .with_tiers(config.connection, config.client)
            .with_ttl_multiplier(config.ttl_multiplier)
            .with_failure_policy(config.store_failure_policy))
    }

    /// Use a different namespace for bucket keys.
    pub fn with_key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.key_prefix = prefix.into();
        self
    }

    /// Replace the connection and client tiers.
    pub fn with_tiers(mut self, connection: RateLimitTier, client: RateLimitTier) -> Self {
        self.connection = connection;
        self.client = client;
        self
    }

    /// Set the snapshot TTL multiplier.
    pub fn with_ttl_multiplier(mut self, multiplier: u32) -> Self {
        self.ttl_multiplier = multiplier;
        self
    }

    /// Set what an unreadable store means for a check.
    pub fn with_failure_policy(mut self, policy: StoreFailurePolicy) -> Self {
        self.failure_policy = policy;
        self
    }

    /// Use a different time source.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// The connection identifier.
    pub fn connection_id(&self) -> &str {
        &self.connection_id
    }

    /// The client identifier.
    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    /// The bucket key namespace.
    pub fn key_prefix(&self) -> &str {
        &self.key_prefix
    }

    /// Configuration of one tier.
    pub fn tier(&self, limit_type: LimitType) -> RateLimitTier {
        match limit_type {
            LimitType::Connection => self.connection,
            LimitType::Client => self.client,
        }
    }

    /// Key of the bucket tracking `endpoint` on one tier.
    pub fn bucket_key(&self, limit_type: LimitType, endpoint: &str) -> BucketKey {
        let scope_id = match limit_type {
            LimitType::Connection => &self.connection_id,
            LimitType::Client => &self.client_id,
        };
        BucketKey::new(&self.key_prefix, limit_type, scope_id, endpoint)
    }

    /// Decide whether a request to `endpoint` may proceed now.
    ///
    /// The connection tier is checked first; if it denies, the client tier is
    /// not consulted. Nothing is written to the store and no token is
    /// consumed, so repeated calls are idempotent.
    pub async fn is_allowed(&self, endpoint: &str) -> Decision {
        let now = self.clock.now();

        for limit_type in TIERS {
            let key = self.bucket_key(limit_type, endpoint).to_store_key();
            let bucket = self.observe(limit_type, &key, now).await;

            trace!(
                key = %key,
                tokens = bucket.tokens(),
                "Checking rate limit"
            );

            if !bucket.is_allowed() {
                let wait_time = bucket.wait_time();
                debug!(
                    key = %key,
                    limit_type = %limit_type,
                    wait_time,
                    "Rate limit exceeded"
                );
                return Decision::deny(limit_type, wait_time);
            }
        }

        Decision::allow()
    }

    /// Consume one token from both tiers' buckets for `endpoint`.
    ///
    /// Call after [`is_allowed`](Self::is_allowed) allowed the request and
    /// before issuing it. Tokens never go below zero. Store failures are
    /// logged and otherwise ignored.
    pub async fn record_hit(&self, endpoint: &str) {
        let now = self.clock.now();

        for limit_type in TIERS {
            let tier = self.tier(limit_type);
            let key = self.bucket_key(limit_type, endpoint).to_store_key();
            let ttl = tier.snapshot_ttl(self.ttl_multiplier);

            let commit = |current| {
                let mut bucket = TokenBucket::observe(current, tier, now);
                bucket.consume();
                bucket.snapshot()
            };

            match self.store.update(&key, ttl, &commit).await {
                Ok(snapshot) => trace!(
                    key = %key,
                    tokens = snapshot.tokens,
                    "Recorded hit"
                ),
                Err(e) => warn!(
                    key = %key,
                    error = %e,
                    "Failed to record hit, bucket left unchanged"
                ),
            }
        }
    }

    /// Current refilled view of both buckets for `endpoint`, without writing.
    pub async fn get_status(&self, endpoint: &str) -> LimiterStatus {
        let now = self.clock.now();
        let connection = self.tier_status(LimitType::Connection, endpoint, now).await;
        let client = self.tier_status(LimitType::Client, endpoint, now).await;
        LimiterStatus { connection, client }
    }

    /// Check and, if allowed, commit a request in one call.
    ///
    /// A denial is returned as [`LexwareError::RateLimited`] carrying the
    /// wait time and the tier that denied.
    pub async fn acquire(&self, endpoint: &str) -> Result<()> {
        self.is_allowed(endpoint).await.into_result()?;
        self.record_hit(endpoint).await;
        Ok(())
    }

    /// Like [`acquire`](Self::acquire), but sleep out denials and retry, up
    /// to `max_attempts` attempts in total.
    pub async fn acquire_with_backoff(&self, endpoint: &str, max_attempts: u32) -> Result<()> {
        let max_attempts = max_attempts.max(1);
        let mut attempt = 1;

        loop {
            match self.acquire(endpoint).await {
                Err(LexwareError::RateLimited {
                    wait_time,
                    limit_type,
                }) if attempt < max_attempts => {
                    let jitter = rand::thread_rng().gen_range(0..=MAX_BACKOFF_JITTER_MS);
                    let backoff = backoff_delay(wait_time, jitter);
                    debug!(
                        endpoint = %endpoint,
                        limit_type = %limit_type,
                        attempt,
                        backoff_ms = backoff.as_millis() as u64,
                        "Backing off before retry"
                    );
                    tokio::time::sleep(backoff).await;
                    attempt += 1;
                }
                result => return result,
            }
        }
    }

    async fn tier_status(&self, limit_type: LimitType, endpoint: &str, now: i64) -> TierStatus {
        let tier = self.tier(limit_type);
        let key = self.bucket_key(limit_type, endpoint).to_store_key();
        let bucket = self.observe(limit_type, &key, now).await;
        TierStatus {
            tokens: bucket.tokens(),
            limit: tier.rate_per_second,
            burst: tier.burst_size,
            key,
        }
    }

    /// Read a bucket and refill it to `now`, applying the failure policy if
    /// the store cannot be read.
    async fn observe(&self, limit_type: LimitType, key: &str, now: i64) -> TokenBucket {
        let tier = self.tier(limit_type);
        match self.store.get(key).await {
            Ok(snapshot) => {
                if snapshot.is_none() {
                    debug!(key = %key, "No stored bucket, starting full");
                }
                TokenBucket::observe(snapshot, tier, now)
            }
            Err(e) => {
                warn!(
                    key = %key,
                    error = %e,
                    policy = ?self.failure_policy,
                    "Failed to read bucket from store"
                );
                match self.failure_policy {
                    StoreFailurePolicy::Open => TokenBucket::full(tier, now),
                    StoreFailurePolicy::Closed => TokenBucket::empty(tier, now),
                }
            }
        }
    }
}

/// Sleep before retrying a denial; saturates instead of overflowing.
fn backoff_delay(wait_time: u64, jitter_ms: u64) -> Duration {
    Duration::from_secs(wait_time).saturating_add(Duration::from_millis(jitter_ms))
}
