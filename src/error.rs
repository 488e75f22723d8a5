//! Error types for the Lexware rate limiter.

use thiserror::Error;

use crate::ratelimit::LimitType;
use crate::store::StoreError;

/// Main error type for rate limiter operations.
#[derive(Error, Debug)]
pub enum LexwareError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// A request was denied by one of the rate limit tiers
    #[error("Rate limit exceeded on {limit_type} tier, retry after {wait_time}s")]
    RateLimited {
        /// Minimum number of seconds to back off before retrying
        wait_time: u64,
        /// The tier that denied the request
        limit_type: LimitType,
    },

    /// Shared state store errors
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl LexwareError {
    /// Whether this error is a rate limit denial the caller may retry after backing off.
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, LexwareError::RateLimited { .. })
    }

    /// The suggested backoff in seconds, if this is a rate limit denial.
    pub fn wait_time(&self) -> Option<u64> {
        match self {
            LexwareError::RateLimited { wait_time, .. } => Some(*wait_time),
            _ => None,
        }
    }
}

impl From<config::ConfigError> for LexwareError {
    fn from(err: config::ConfigError) -> Self {
        LexwareError::Config(err.to_string())
    }
}

/// Result type alias for rate limiter operations.
pub type Result<T> = std::result::Result<T, LexwareError>;
