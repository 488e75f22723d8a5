//! Lexware Ratelimit - client-side rate limiting for the Lexware Office API
//!
//! This crate implements a two-tier token bucket rate limiter that the API
//! client consults before every outbound request. Quotas are tracked per
//! connection and per client, keyed by normalized endpoint, with all bucket
//! state kept in an injected key-value store.

pub mod config;
pub mod error;
pub mod ratelimit;
pub mod store;

pub use error::{LexwareError, Result};
pub use ratelimit::{Decision, LexwareRateLimiter, LimitType, LimiterStatus};
pub use store::{BucketSnapshot, MemoryStore, StateStore};
