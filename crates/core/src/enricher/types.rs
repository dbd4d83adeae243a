//! Item-level enrichment result.

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::analysis::{
    mean, AnalysisTaskKind, CategoryPayload, EntitiesPayload, KeywordsPayload, SentimentPayload,
    TaskPayload, TaskResult, TaskStatus,
};
use crate::content::{ContentItem, ContentType};

/// Overall outcome for one item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemStatus {
    /// Every enabled task succeeded.
    Success,
    /// At least one task succeeded and at least one did not.
    Partial,
    /// No task succeeded.
    Failed,
    /// Input did not pass pre-validation.
    Skipped,
}

impl ItemStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemStatus::Success => "success",
            ItemStatus::Partial => "partial",
            ItemStatus::Failed => "failed",
            ItemStatus::Skipped => "skipped",
        }
    }
}

impl fmt::Display for ItemStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Aggregated result of all tasks run for one item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemEnrichmentResult {
    pub item_id: i64,
    pub content_type: ContentType,
    pub status: ItemStatus,
    pub task_results: BTreeMap<AnalysisTaskKind, TaskResult>,
    /// Mean of the successful tasks' scores; 0 when none succeeded.
    pub overall_confidence: f32,
    pub total_duration_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    /// How many times the item was submitted (1 without retries).
    pub attempts: u32,
    pub completed_at: DateTime<Utc>,
}

impl ItemEnrichmentResult {
    /// Aggregate task results into an item result.
    pub fn from_task_results(
        item: &ContentItem,
        results: Vec<TaskResult>,
        duration: Duration,
    ) -> Self {
        let succeeded = results.iter().filter(|r| r.is_success()).count();
        let all_skipped = !results.is_empty()
            && results.iter().all(|r| r.status == TaskStatus::Skipped);

        let status = if all_skipped {
            ItemStatus::Skipped
        } else if succeeded == 0 {
            ItemStatus::Failed
        } else if succeeded == results.len() {
            ItemStatus::Success
        } else {
            ItemStatus::Partial
        };

        let overall_confidence = mean(results.iter().filter_map(TaskResult::item_score))
            .unwrap_or(0.0)
            .clamp(0.0, 1.0);

        let error_message = if status == ItemStatus::Success {
            None
        } else {
            let errors: Vec<String> = results
                .iter()
                .filter(|r| !r.is_success())
                .filter_map(|r| r.error.as_ref().map(|e| format!("{}: {}", r.kind, e)))
                .collect();
            (!errors.is_empty()).then(|| errors.join("; "))
        };

        Self {
            item_id: item.id,
            content_type: item.content_type,
            status,
            task_results: results.into_iter().map(|r| (r.kind, r)).collect(),
            overall_confidence,
            total_duration_ms: duration.as_millis() as u64,
            error_message,
            attempts: 1,
            completed_at: Utc::now(),
        }
    }

    /// Item rejected before any task ran.
    pub fn skipped(item: &ContentItem, reason: impl Into<String>) -> Self {
        Self::without_tasks(item, ItemStatus::Skipped, reason.into(), Duration::ZERO)
    }

    /// Item that failed outside of task execution (e.g. a crashed worker).
    pub fn failed(item: &ContentItem, reason: impl Into<String>, duration: Duration) -> Self {
        Self::without_tasks(item, ItemStatus::Failed, reason.into(), duration)
    }

    fn without_tasks(
        item: &ContentItem,
        status: ItemStatus,
        reason: String,
        duration: Duration,
    ) -> Self {
        Self {
            item_id: item.id,
            content_type: item.content_type,
            status,
            task_results: BTreeMap::new(),
            overall_confidence: 0.0,
            total_duration_ms: duration.as_millis() as u64,
            error_message: Some(reason),
            attempts: 1,
            completed_at: Utc::now(),
        }
    }

    pub fn with_attempts(mut self, attempts: u32) -> Self {
        self.attempts = attempts;
        self
    }

    /// Failed with at least one provider error worth another attempt.
    ///
    /// Items failed without task results (crashed workers) also qualify.
    pub fn is_retryable(&self) -> bool {
        if self.status != ItemStatus::Failed {
            return false;
        }
        self.task_results.is_empty()
            || self
                .task_results
                .values()
                .filter_map(TaskResult::error_kind)
                .any(|kind| kind.is_retryable())
    }

    pub fn task(&self, kind: AnalysisTaskKind) -> Option<&TaskResult> {
        self.task_results.get(&kind)
    }

    fn payload(&self, kind: AnalysisTaskKind) -> Option<&TaskPayload> {
        self.task(kind).and_then(|r| r.payload.as_ref())
    }

    pub fn sentiment(&self) -> Option<&SentimentPayload> {
        match self.payload(AnalysisTaskKind::Sentiment) {
            Some(TaskPayload::Sentiment(p)) => Some(p),
            _ => None,
        }
    }

    pub fn entities(&self) -> Option<&EntitiesPayload> {
        match self.payload(AnalysisTaskKind::Entities) {
            Some(TaskPayload::Entities(p)) => Some(p),
            _ => None,
        }
    }

    pub fn keywords(&self) -> Option<&KeywordsPayload> {
        match self.payload(AnalysisTaskKind::Keywords) {
            Some(TaskPayload::Keywords(p)) => Some(p),
            _ => None,
        }
    }

    pub fn category(&self) -> Option<&CategoryPayload> {
        match self.payload(AnalysisTaskKind::Category) {
            Some(TaskPayload::Category(p)) => Some(p),
            _ => None,
        }
    }

    /// Language reported by the first task that detected one.
    pub fn detected_language(&self) -> Option<&str> {
        self.sentiment()
            .and_then(|p| p.language_detected.as_deref())
            .or_else(|| self.category().and_then(|p| p.language_detected.as_deref()))
            .or_else(|| self.entities().and_then(|p| p.language_detected.as_deref()))
            .or_else(|| self.keywords().and_then(|p| p.language_detected.as_deref()))
    }
}
