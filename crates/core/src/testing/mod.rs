//! Testing utilities and mock implementations.
//!
//! Mocks for the provider client and the content store, so that the whole
//! engine can be exercised without a network or a database.
//!
//! # Example
//!
//! ```rust,ignore
//! use enricher_core::testing::{MockLlmClient, InMemoryContentStore};
//!
//! let client = MockLlmClient::new();
//! let store = InMemoryContentStore::new();
//! store.seed(ContentType::Article, 10)?;
//!
//! client.set_delay(Duration::from_millis(20)).await;
//! // Build an EnrichmentService over them...
//! ```

mod mock_llm;
mod mock_store;

pub use mock_llm::{detect_task, MockLlmClient, MockReply, RecordedCall};
pub use mock_store::InMemoryContentStore;

/// Test fixtures and helper functions.
pub mod fixtures {
    use std::time::Duration;

    use crate::analysis::{
        AnalysisTaskKind, Sentiment, SentimentPayload, TaskError, TaskErrorKind, TaskPayload,
        TaskResult,
    };
    use crate::content::{ContentItem, ContentType};
    use crate::enricher::{ItemEnrichmentResult, ItemStatus};

    /// Create a content item with text long enough for every content type.
    pub fn item(id: i64, content_type: ContentType) -> ContentItem {
        ContentItem::new(
            id,
            content_type,
            format!("Item {} reports on the parliament vote and the new budget.", id),
        )
    }

    /// Create `count` items with ids starting at 1.
    pub fn items(content_type: ContentType, count: usize) -> Vec<ContentItem> {
        (1..=count as i64).map(|id| item(id, content_type)).collect()
    }

    /// Successful sentiment result with the given confidence.
    pub fn sentiment_result(confidence: f32) -> TaskResult {
        TaskResult::success(
            TaskPayload::Sentiment(SentimentPayload {
                sentiment: Sentiment::Neutral,
                score: 0,
                confidence,
                reasoning: None,
                emotions: vec![],
                language_detected: None,
            }),
            confidence,
            5,
        )
    }

    /// Item result with the given status, without running any task.
    pub fn item_result(item: &ContentItem, status: ItemStatus) -> ItemEnrichmentResult {
        match status {
            ItemStatus::Success => ItemEnrichmentResult::from_task_results(
                item,
                vec![sentiment_result(0.8)],
                Duration::from_millis(5),
            ),
            ItemStatus::Partial => ItemEnrichmentResult::from_task_results(
                item,
                vec![
                    sentiment_result(0.8),
                    TaskResult::failed(
                        AnalysisTaskKind::Keywords,
                        TaskError::new(TaskErrorKind::Timeout, "timed out"),
                        5,
                    ),
                ],
                Duration::from_millis(5),
            ),
            ItemStatus::Failed => {
                ItemEnrichmentResult::failed(item, "provider unavailable", Duration::from_millis(5))
            }
            ItemStatus::Skipped => ItemEnrichmentResult::skipped(item, "text too short"),
        }
    }
}
