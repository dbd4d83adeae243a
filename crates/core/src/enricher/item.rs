//! Runs every enabled task for one item and aggregates the results.

use std::sync::Arc;
use std::time::Instant;

use futures::future::join_all;
use tracing::{debug, info};

use crate::analysis::{TaskError, TaskErrorKind, TaskInput, TaskResult, TaskRunner};
use crate::content::ContentItem;
use crate::metrics;

use super::config::ItemEnricherConfig;
use super::types::{ItemEnrichmentResult, ItemStatus};

/// Enriches single items by fanning out to all enabled tasks concurrently.
pub struct ItemEnricher {
    runner: Arc<TaskRunner>,
    config: ItemEnricherConfig,
}

impl ItemEnricher {
    pub fn new(runner: Arc<TaskRunner>, config: ItemEnricherConfig) -> Self {
        Self { runner, config }
    }

    pub fn config(&self) -> &ItemEnricherConfig {
        &self.config
    }

    /// Enrich one item.
    ///
    /// Never fails: provider errors, validation errors and timeouts end
    /// up as task results inside the returned item result.
    pub async fn enrich(&self, item: &ContentItem) -> ItemEnrichmentResult {
        let started = Instant::now();

        let length = item.text.trim().chars().count();
        if length < self.config.min_content_length {
            debug!(
                item_id = item.id,
                content_type = %item.content_type,
                length,
                min = self.config.min_content_length,
                "Skipping item below minimum length"
            );
            let result = ItemEnrichmentResult::skipped(
                item,
                format!(
                    "text has {} characters, minimum is {}",
                    length, self.config.min_content_length
                ),
            );
            record_metrics(&result);
            return result;
        }

        let tasks = self.config.enabled_tasks();
        if tasks.is_empty() {
            let result = ItemEnrichmentResult::skipped(item, "no analysis tasks enabled");
            record_metrics(&result);
            return result;
        }

        let input = TaskInput {
            text: item.text.clone(),
            content_type: item.content_type,
            language_hint: item.language_hint.clone(),
        };
        let limits = self.config.task_limits();
        let item_timeout = self.config.item_timeout();
        let deadline = tokio::time::Instant::now() + item_timeout;

        let runs = tasks.iter().map(|&kind| {
            let input = &input;
            let limits = &limits;
            async move {
                match tokio::time::timeout_at(deadline, self.runner.run(kind, input, limits)).await
                {
                    Ok(result) => result,
                    Err(_) => TaskResult::failed(
                        kind,
                        TaskError::new(
                            TaskErrorKind::Timeout,
                            format!("item deadline of {:?} reached", item_timeout),
                        ),
                        started.elapsed().as_millis() as u64,
                    ),
                }
            }
        });
        let results = join_all(runs).await;

        let result = ItemEnrichmentResult::from_task_results(item, results, started.elapsed());
        info!(
            item_id = item.id,
            content_type = %item.content_type,
            status = %result.status,
            confidence = result.overall_confidence,
            duration_ms = result.total_duration_ms,
            "Item enriched"
        );
        record_metrics(&result);
        result
    }
}

fn record_metrics(result: &ItemEnrichmentResult) {
    let content_type = result.content_type.as_str();
    metrics::ITEMS_PROCESSED
        .with_label_values(&[content_type, result.status.as_str()])
        .inc();
    if result.status != ItemStatus::Skipped {
        metrics::ITEM_DURATION
            .with_label_values(&[content_type])
            .observe(result.total_duration_ms as f64 / 1000.0);
        metrics::ITEM_CONFIDENCE
            .with_label_values(&[content_type])
            .observe(f64::from(result.overall_confidence));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use crate::analysis::{AnalysisTaskKind, TaskRunnerConfig, TaskStatus};
    use crate::content::ContentType;
    use crate::llm::LlmError;
    use crate::ratelimit::{RateLimiter, RateLimiterConfig};
    use crate::testing::MockLlmClient;

    fn enricher(client: Arc<MockLlmClient>, config: ItemEnricherConfig) -> ItemEnricher {
        let limiter = Arc::new(RateLimiter::new(&RateLimiterConfig::uniform(1000)));
        let runner = TaskRunner::new(client, limiter, &TaskRunnerConfig::default());
        ItemEnricher::new(Arc::new(runner), config)
    }

    fn article(text: &str) -> ContentItem {
        ContentItem::new(1, ContentType::Article, text)
    }

    #[tokio::test]
    async fn test_short_text_is_skipped_without_calls() {
        let client = Arc::new(MockLlmClient::new());
        let config = ItemEnricherConfig::default().with_min_content_length(20);
        let enricher = enricher(Arc::clone(&client), config);

        let result = enricher.enrich(&article("Short.")).await;

        assert_eq!(result.status, ItemStatus::Skipped);
        assert_eq!(result.overall_confidence, 0.0);
        assert!(result.task_results.is_empty());
        assert_eq!(client.call_count().await, 0);
    }

    #[tokio::test]
    async fn test_all_tasks_succeed() {
        let client = Arc::new(MockLlmClient::new());
        let enricher = enricher(Arc::clone(&client), ItemEnricherConfig::default());

        let result = enricher
            .enrich(&article("The central bank raised interest rates again this quarter."))
            .await;

        assert_eq!(result.status, ItemStatus::Success);
        assert_eq!(result.task_results.len(), 4);
        assert!(result.overall_confidence > 0.0);
        assert_eq!(client.call_count().await, 4);
    }

    #[tokio::test]
    async fn test_partial_when_one_task_fails() {
        let client = Arc::new(MockLlmClient::new());
        client
            .set_response(
                AnalysisTaskKind::Sentiment,
                r#"{"sentiment": "positive", "confidence": 0.8}"#,
            )
            .await;
        client
            .set_response(
                AnalysisTaskKind::Entities,
                r#"{"entities": [{"text": "Acme Corp", "type": "ORGANIZATION", "confidence": 0.6}]}"#,
            )
            .await;
        client
            .fail_task(AnalysisTaskKind::Keywords, LlmError::Timeout(Duration::from_secs(1)))
            .await;
        client
            .set_response(
                AnalysisTaskKind::Category,
                r#"{"primary_category": "economy", "confidence": 0.9}"#,
            )
            .await;
        let enricher = enricher(client, ItemEnricherConfig::default());

        let result = enricher
            .enrich(&article("Acme Corp reported strong results for the year."))
            .await;

        assert_eq!(result.status, ItemStatus::Partial);
        let keywords = result.task(AnalysisTaskKind::Keywords).unwrap();
        assert_eq!(keywords.status, TaskStatus::Failed);
        assert_eq!(keywords.error_kind(), Some(TaskErrorKind::Timeout));
        assert!(result.task(AnalysisTaskKind::Sentiment).unwrap().is_success());
        assert!((result.overall_confidence - 0.7667).abs() < 1e-3);
    }

    #[tokio::test]
    async fn test_only_enabled_tasks_run() {
        let client = Arc::new(MockLlmClient::new());
        let config = ItemEnricherConfig::default()
            .with_tasks(vec![AnalysisTaskKind::Sentiment, AnalysisTaskKind::Keywords]);
        let enricher = enricher(Arc::clone(&client), config);

        let result = enricher
            .enrich(&article("A long enough comment about the local football match."))
            .await;

        assert_eq!(result.task_results.len(), 2);
        assert!(result.task(AnalysisTaskKind::Category).is_none());
        assert_eq!(client.call_count().await, 2);
    }

    #[tokio::test]
    async fn test_tasks_run_concurrently() {
        let client = Arc::new(MockLlmClient::new());
        client.set_delay(Duration::from_millis(200)).await;
        let enricher = enricher(Arc::clone(&client), ItemEnricherConfig::default());

        let started = Instant::now();
        let result = enricher
            .enrich(&article("Parliament debated the new transport law for hours."))
            .await;

        assert_eq!(result.status, ItemStatus::Success);
        assert!(started.elapsed() < Duration::from_millis(700));
        assert_eq!(client.max_concurrency(), 4);
    }

    #[tokio::test]
    async fn test_all_tasks_timing_out_fails_item() {
        let client = Arc::new(MockLlmClient::new());
        client.set_delay(Duration::from_secs(3)).await;
        let config = ItemEnricherConfig::default()
            .with_timeouts(Duration::from_secs(1), Duration::from_secs(1));
        let enricher = enricher(client, config);

        let result = enricher
            .enrich(&article("Markets were quiet ahead of the holiday weekend."))
            .await;

        assert_eq!(result.status, ItemStatus::Failed);
        assert_eq!(result.overall_confidence, 0.0);
        assert!(result
            .task_results
            .values()
            .all(|r| r.error_kind() == Some(TaskErrorKind::Timeout)));
        assert!(result.is_retryable());
    }
}
