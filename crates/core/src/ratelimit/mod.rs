//! Outbound request rate limiting.

mod config;
mod limiter;
mod window;

pub use config::RateLimiterConfig;
pub use limiter::{LimitScope, RateLimitError, RateLimiter};
pub use window::{RateLimitStatus, SlidingWindow};
