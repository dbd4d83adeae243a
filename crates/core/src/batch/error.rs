//! Orchestration-level errors.

use crate::ratelimit::RateLimitError;

/// The only errors that abort a run. Item-level problems never surface
/// here; they end up in the run statistics.
#[derive(Debug, thiserror::Error)]
pub enum OrchestrationError {
    #[error("Invalid batch configuration: {0}")]
    InvalidConfig(String),

    #[error("Rate limiter unavailable: {0}")]
    RateLimiterUnavailable(#[from] RateLimitError),

    #[error("Worker pool failure: {0}")]
    WorkerPool(String),
}
