//! Rate limiting logic and bucket state management.

mod bucket;
mod clock;
mod endpoint;
mod limiter;
mod tier;

pub use bucket::TokenBucket;
pub use clock::{Clock, ManualClock, SystemClock};
pub use endpoint::{normalize_endpoint, BucketKey, ID_PLACEHOLDER, ROOT_ENDPOINT, SEGMENT_SEPARATOR};
pub use limiter::{Decision, LexwareRateLimiter, LimiterStatus, TierStatus};
pub use tier::{LimitType, RateLimitTier};
