//! Batch orchestration: partitioning, bounded concurrency, pacing and
//! run statistics.

mod config;
mod error;
mod orchestrator;
mod stats;

pub use config::{BatchConfig, MAX_WORKERS};
pub use error::OrchestrationError;
pub use orchestrator::{BatchOrchestrator, ItemCallback};
pub use stats::BatchStatistics;
