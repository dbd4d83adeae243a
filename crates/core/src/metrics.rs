//! Prometheus metrics for the enrichment engine.
//!
//! This module provides metrics for:
//! - Item enrichment (status counts, durations, confidence, retries)
//! - Analysis tasks (results, errors, durations)
//! - Rate limiting and batch pacing
//! - Pipeline runs and provider token usage

use once_cell::sync::Lazy;
use prometheus::{HistogramOpts, HistogramVec, IntCounterVec, Opts};

// =============================================================================
// Item Metrics
// =============================================================================

/// Items processed by content type and final status.
pub static ITEMS_PROCESSED: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("enricher_items_processed_total", "Total items processed"),
        &["content_type", "status"], // "success", "partial", "failed", "skipped"
    )
    .unwrap()
});

/// Item enrichment duration in seconds.
pub static ITEM_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "enricher_item_duration_seconds",
            "Duration of item enrichment including all tasks",
        )
        .buckets(vec![0.1, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0]),
        &["content_type"],
    )
    .unwrap()
});

/// Overall confidence of enriched items.
pub static ITEM_CONFIDENCE: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "enricher_item_confidence",
            "Distribution of item overall confidence",
        )
        .buckets(vec![0.1, 0.2, 0.3, 0.4, 0.5, 0.6, 0.7, 0.8, 0.9, 1.0]),
        &["content_type"],
    )
    .unwrap()
});

/// Item resubmissions after a retryable failure.
pub static ITEM_RETRIES: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("enricher_item_retries_total", "Total item retries"),
        &["content_type"],
    )
    .unwrap()
});

// =============================================================================
// Task Metrics
// =============================================================================

/// Task results by task kind and status.
pub static TASK_RESULTS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("enricher_task_results_total", "Total analysis task results"),
        &["task", "status"],
    )
    .unwrap()
});

/// Task failures by task kind and error kind.
pub static TASK_ERRORS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("enricher_task_errors_total", "Total analysis task errors"),
        &["task", "error"],
    )
    .unwrap()
});

/// Task duration in seconds.
pub static TASK_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "enricher_task_duration_seconds",
            "Duration of one analysis task",
        )
        .buckets(vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0]),
        &["task"],
    )
    .unwrap()
});

// =============================================================================
// Rate Limiting & Batches
// =============================================================================

/// Requests refused by the rate limiter.
pub static RATE_LIMIT_REJECTIONS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "enricher_rate_limit_rejections_total",
            "Total requests refused by the rate limiter",
        ),
        &["content_type", "scope"], // "content_type", "global"
    )
    .unwrap()
});

/// Batches completed.
pub static BATCHES_COMPLETED: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("enricher_batches_completed_total", "Total batches completed"),
        &["content_type"],
    )
    .unwrap()
});

// =============================================================================
// Pipeline & Provider
// =============================================================================

/// Pipeline runs by content type and outcome.
pub static PIPELINE_RUNS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("enricher_pipeline_runs_total", "Total pipeline runs"),
        &["content_type", "result"], // "completed", "cancelled", "failed"
    )
    .unwrap()
});

/// Result writes that the content store rejected.
pub static STORE_WRITE_FAILURES: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "enricher_store_write_failures_total",
            "Total failed result writes",
        ),
        &["content_type"],
    )
    .unwrap()
});

/// Provider tokens by provider and direction.
pub static LLM_TOKENS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("enricher_llm_tokens_total", "Total LLM tokens used"),
        &["provider", "direction"], // "input", "output"
    )
    .unwrap()
});

/// Returns all core metrics for registration.
pub fn all_metrics() -> Vec<Box<dyn prometheus::core::Collector>> {
    vec![
        Box::new(ITEMS_PROCESSED.clone()),
        Box::new(ITEM_DURATION.clone()),
        Box::new(ITEM_CONFIDENCE.clone()),
        Box::new(ITEM_RETRIES.clone()),
        Box::new(TASK_RESULTS.clone()),
        Box::new(TASK_ERRORS.clone()),
        Box::new(TASK_DURATION.clone()),
        Box::new(RATE_LIMIT_REJECTIONS.clone()),
        Box::new(BATCHES_COMPLETED.clone()),
        Box::new(PIPELINE_RUNS.clone()),
        Box::new(STORE_WRITE_FAILURES.clone()),
        Box::new(LLM_TOKENS.clone()),
    ]
}
