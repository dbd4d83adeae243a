//! Run-level statistics, accumulated as items complete.

use std::collections::BTreeMap;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::analysis::{AnalysisTaskKind, TaskStatus};
use crate::content::ContentType;
use crate::enricher::{ItemEnrichmentResult, ItemStatus};

/// Statistics of one orchestrator run.
///
/// `processed_items == successful_items + failed_items + skipped_items`
/// always holds; partial items count as successful and are also reported
/// in `partial_items`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchStatistics {
    pub content_type: ContentType,
    pub total_items: usize,
    pub processed_items: usize,
    pub successful_items: usize,
    pub partial_items: usize,
    pub failed_items: usize,
    pub skipped_items: usize,
    /// Item resubmissions after a retryable failure.
    pub retries: usize,
    /// Successful task results per kind.
    pub per_task_counts: BTreeMap<AnalysisTaskKind, usize>,
    /// Failed task results per kind.
    pub per_task_failures: BTreeMap<AnalysisTaskKind, usize>,
    /// Mean overall confidence of successful (and partial) items.
    pub average_confidence: f32,
    pub batches_total: usize,
    pub batches_completed: usize,
    /// Highest number of items in flight at once.
    pub peak_concurrency: usize,
    pub cancelled: bool,
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    pub total_duration_ms: u64,
}

impl BatchStatistics {
    pub fn empty(content_type: ContentType) -> Self {
        Self {
            content_type,
            total_items: 0,
            processed_items: 0,
            successful_items: 0,
            partial_items: 0,
            failed_items: 0,
            skipped_items: 0,
            retries: 0,
            per_task_counts: BTreeMap::new(),
            per_task_failures: BTreeMap::new(),
            average_confidence: 0.0,
            batches_total: 0,
            batches_completed: 0,
            peak_concurrency: 0,
            cancelled: false,
            started_at: Utc::now(),
            completed_at: None,
            total_duration_ms: 0,
        }
    }

    pub fn is_finished(&self) -> bool {
        self.completed_at.is_some()
    }

    /// Share of processed items that succeeded (0 when nothing processed).
    pub fn success_rate(&self) -> f32 {
        if self.processed_items == 0 {
            0.0
        } else {
            self.successful_items as f32 / self.processed_items as f32
        }
    }
}

/// Mutable accumulator behind the orchestrator's lock.
#[derive(Debug)]
pub(crate) struct StatsAccumulator {
    stats: BatchStatistics,
    confidence_sum: f64,
    started: Instant,
}

impl StatsAccumulator {
    pub(crate) fn new(content_type: ContentType, total_items: usize, batches_total: usize) -> Self {
        let mut stats = BatchStatistics::empty(content_type);
        stats.total_items = total_items;
        stats.batches_total = batches_total;
        Self {
            stats,
            confidence_sum: 0.0,
            started: Instant::now(),
        }
    }

    pub(crate) fn record(&mut self, result: &ItemEnrichmentResult) {
        let stats = &mut self.stats;
        stats.processed_items += 1;
        match result.status {
            ItemStatus::Success => stats.successful_items += 1,
            ItemStatus::Partial => {
                stats.successful_items += 1;
                stats.partial_items += 1;
            }
            ItemStatus::Failed => stats.failed_items += 1,
            ItemStatus::Skipped => stats.skipped_items += 1,
        }
        if matches!(result.status, ItemStatus::Success | ItemStatus::Partial) {
            self.confidence_sum += f64::from(result.overall_confidence);
        }

        for task in result.task_results.values() {
            let counts = match task.status {
                TaskStatus::Success => &mut stats.per_task_counts,
                TaskStatus::Failed => &mut stats.per_task_failures,
                TaskStatus::Skipped => continue,
            };
            *counts.entry(task.kind).or_insert(0) += 1;
        }
    }

    pub(crate) fn record_retry(&mut self) {
        self.stats.retries += 1;
    }

    pub(crate) fn batch_completed(&mut self) {
        self.stats.batches_completed += 1;
    }

    pub(crate) fn observe_concurrency(&mut self, in_flight: usize) {
        self.stats.peak_concurrency = self.stats.peak_concurrency.max(in_flight);
    }

    /// Interim statistics of the running run.
    pub(crate) fn snapshot(&self) -> BatchStatistics {
        let mut stats = self.stats.clone();
        stats.average_confidence = if stats.successful_items == 0 {
            0.0
        } else {
            (self.confidence_sum / stats.successful_items as f64) as f32
        };
        stats.total_duration_ms = self.started.elapsed().as_millis() as u64;
        stats
    }

    pub(crate) fn finish(&mut self, cancelled: bool) -> BatchStatistics {
        self.stats.cancelled = cancelled;
        self.stats.completed_at = Some(Utc::now());
        let stats = self.snapshot();
        self.stats = stats.clone();
        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::fixtures;

    #[test]
    fn test_counts_add_up() {
        let items = fixtures::items(ContentType::Article, 4);
        let mut acc = StatsAccumulator::new(ContentType::Article, 4, 1);

        acc.record(&fixtures::item_result(&items[0], ItemStatus::Success));
        acc.record(&fixtures::item_result(&items[1], ItemStatus::Partial));
        acc.record(&fixtures::item_result(&items[2], ItemStatus::Failed));
        acc.record(&fixtures::item_result(&items[3], ItemStatus::Skipped));

        let stats = acc.finish(false);
        assert_eq!(stats.processed_items, 4);
        assert_eq!(
            stats.processed_items,
            stats.successful_items + stats.failed_items + stats.skipped_items
        );
        assert_eq!(stats.successful_items, 2);
        assert_eq!(stats.partial_items, 1);
        assert_eq!(stats.per_task_counts[&AnalysisTaskKind::Sentiment], 2);
        assert_eq!(stats.per_task_failures[&AnalysisTaskKind::Keywords], 1);
        assert!((stats.average_confidence - 0.8).abs() < 1e-6);
        assert!(stats.is_finished());
        assert!((stats.success_rate() - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_snapshot_is_interim() {
        let items = fixtures::items(ContentType::Post, 1);
        let mut acc = StatsAccumulator::new(ContentType::Post, 3, 1);
        acc.record(&fixtures::item_result(&items[0], ItemStatus::Success));

        let snapshot = acc.snapshot();
        assert_eq!(snapshot.processed_items, 1);
        assert_eq!(snapshot.total_items, 3);
        assert!(!snapshot.is_finished());
    }

    #[test]
    fn test_no_successes_means_zero_confidence() {
        let items = fixtures::items(ContentType::Comment, 1);
        let mut acc = StatsAccumulator::new(ContentType::Comment, 1, 1);
        acc.record(&fixtures::item_result(&items[0], ItemStatus::Failed));

        let stats = acc.finish(true);
        assert_eq!(stats.average_confidence, 0.0);
        assert!(stats.cancelled);
    }
}
