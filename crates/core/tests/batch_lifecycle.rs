//! Batch orchestration integration tests.
//!
//! These drive the orchestrator end to end through the real task runner,
//! rate limiter and item enricher, with only the provider mocked.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;

use enricher_core::{
    analysis::TaskErrorKind,
    enricher::ItemEnricherConfig,
    llm::LlmError,
    testing::{fixtures, MockLlmClient, MockReply},
    AnalysisTaskKind, BatchConfig, BatchOrchestrator, BatchStatistics, ContentType, ItemEnricher,
    ItemEnrichmentResult, ItemStatus, RateLimiter, RateLimiterConfig, TaskRunner,
    TaskRunnerConfig,
};

/// Completed item ids with the instant each one was reported.
type Completions = Arc<Mutex<Vec<(i64, Instant)>>>;

struct TestHarness {
    client: Arc<MockLlmClient>,
    limiter: Arc<RateLimiter>,
    completions: Completions,
    results: Arc<Mutex<Vec<ItemEnrichmentResult>>>,
}

impl TestHarness {
    fn new(rate_limit: RateLimiterConfig) -> Self {
        Self {
            client: Arc::new(MockLlmClient::new()),
            limiter: Arc::new(RateLimiter::new(&rate_limit)),
            completions: Arc::new(Mutex::new(Vec::new())),
            results: Arc::new(Mutex::new(Vec::new())),
        }
    }

    fn unlimited() -> Self {
        Self::new(RateLimiterConfig::uniform(10_000))
    }

    /// Orchestrator running only the sentiment task, so provider
    /// concurrency equals item concurrency.
    fn orchestrator(&self, config: BatchConfig) -> BatchOrchestrator {
        let runner = TaskRunner::new(
            Arc::clone(&self.client) as _,
            Arc::clone(&self.limiter),
            &TaskRunnerConfig::default(),
        );
        let enricher = ItemEnricher::new(
            Arc::new(runner),
            ItemEnricherConfig::default().with_tasks(vec![AnalysisTaskKind::Sentiment]),
        );
        let completions = Arc::clone(&self.completions);
        let results = Arc::clone(&self.results);
        BatchOrchestrator::new(Arc::new(enricher), Arc::clone(&self.limiter), config)
            .with_item_callback(Arc::new(move |result: &ItemEnrichmentResult| {
                completions
                    .lock()
                    .unwrap()
                    .push((result.item_id, Instant::now()));
                results.lock().unwrap().push(result.clone());
            }))
    }

    fn completed_ids(&self) -> Vec<i64> {
        self.completions.lock().unwrap().iter().map(|(id, _)| *id).collect()
    }
}

fn assert_consistent(stats: &BatchStatistics) {
    assert_eq!(
        stats.processed_items,
        stats.successful_items + stats.failed_items + stats.skipped_items,
        "processed must equal successful + failed + skipped: {:?}",
        stats
    );
    assert!(stats.processed_items <= stats.total_items);
}

#[tokio::test]
async fn test_batches_run_sequentially_with_bounded_workers() {
    let harness = TestHarness::unlimited();
    harness.client.set_delay(Duration::from_millis(50)).await;
    let config = BatchConfig::default()
        .with_batch_size(5)
        .with_max_workers(3)
        .with_inter_batch_delay_ms(200);
    let orchestrator = harness.orchestrator(config);

    let stats = orchestrator
        .run(
            ContentType::Article,
            fixtures::items(ContentType::Article, 10),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    assert_eq!(stats.batches_total, 2);
    assert_eq!(stats.batches_completed, 2);
    assert_eq!(stats.processed_items, 10);
    assert_eq!(stats.successful_items, 10);
    assert!(stats.peak_concurrency <= 3);
    assert!(harness.client.max_concurrency() <= 3);
    assert_consistent(&stats);

    // The first batch is fully reported before anything of the second.
    let ids = harness.completed_ids();
    let mut first: Vec<i64> = ids[..5].to_vec();
    first.sort_unstable();
    assert_eq!(first, vec![1, 2, 3, 4, 5]);

    let completions = harness.completions.lock().unwrap();
    let first_done = completions[..5].iter().map(|(_, t)| *t).max().unwrap();
    let second_done = completions[5..].iter().map(|(_, t)| *t).min().unwrap();
    assert!(second_done.duration_since(first_done) >= Duration::from_millis(200));
}

#[tokio::test]
async fn test_cancellation_stops_between_items() {
    let harness = TestHarness::unlimited();
    harness.client.set_delay(Duration::from_millis(100)).await;
    let config = BatchConfig::default()
        .with_batch_size(5)
        .with_max_workers(2)
        .with_inter_batch_delay_ms(10);
    let orchestrator = harness.orchestrator(config);

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(150)).await;
        trigger.cancel();
    });

    let stats = orchestrator
        .run(
            ContentType::Post,
            fixtures::items(ContentType::Post, 20),
            &cancel,
        )
        .await
        .unwrap();

    assert!(stats.cancelled);
    assert!(stats.is_finished());
    assert_eq!(stats.total_items, 20);
    assert!(stats.processed_items < 20);
    assert!(stats.batches_completed < stats.batches_total);
    assert_consistent(&stats);
    // Only finished items are reported.
    assert_eq!(harness.completed_ids().len(), stats.processed_items);
}

#[tokio::test]
async fn test_panic_and_retry_in_one_run() {
    let harness = TestHarness::unlimited();
    harness
        .client
        .set_handler(|_, request| {
            request
                .prompt
                .contains("Item 4 ")
                .then(|| MockReply::Panic("provider bug".to_string()))
        })
        .await;
    harness
        .client
        .push_reply(
            AnalysisTaskKind::Sentiment,
            MockReply::Error(LlmError::Timeout(Duration::from_secs(5))),
        )
        .await;
    let config = BatchConfig::default()
        .with_batch_size(3)
        .with_max_workers(1)
        .with_inter_batch_delay_ms(5)
        .with_max_item_retries(1);
    let orchestrator = harness.orchestrator(config);

    let stats = orchestrator
        .run(
            ContentType::Comment,
            fixtures::items(ContentType::Comment, 6),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    assert_eq!(stats.processed_items, 6);
    assert_eq!(stats.failed_items, 1);
    assert_eq!(stats.successful_items, 5);
    // One retry for the timed-out first item, one for the panicking item.
    assert_eq!(stats.retries, 2);
    assert_consistent(&stats);

    let results = harness.results.lock().unwrap();
    let first = results.iter().find(|r| r.item_id == 1).unwrap();
    assert_eq!(first.status, ItemStatus::Success);
    assert_eq!(first.attempts, 2);

    let panicked = results.iter().find(|r| r.item_id == 4).unwrap();
    assert_eq!(panicked.status, ItemStatus::Failed);
    assert!(panicked.task_results.is_empty());
    assert!(panicked.error_message.is_some());
}

#[tokio::test]
async fn test_rate_limit_burst_fails_excess_items_without_retry() {
    let harness = TestHarness::new(RateLimiterConfig::uniform(3));
    let config = BatchConfig::default()
        .with_batch_size(5)
        .with_max_workers(1)
        .with_inter_batch_delay_ms(5)
        .with_max_item_retries(2);
    let orchestrator = harness.orchestrator(config);

    let stats = orchestrator
        .run(
            ContentType::Article,
            fixtures::items(ContentType::Article, 5),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    assert_eq!(stats.successful_items, 3);
    assert_eq!(stats.failed_items, 2);
    assert_eq!(stats.retries, 0);
    assert_eq!(harness.client.call_count().await, 3);
    assert_consistent(&stats);

    let results = harness.results.lock().unwrap();
    let limited: Vec<_> = results
        .iter()
        .filter(|r| r.status == ItemStatus::Failed)
        .collect();
    assert_eq!(limited.len(), 2);
    for result in limited {
        let sentiment = result.task(AnalysisTaskKind::Sentiment).unwrap();
        assert_eq!(
            sentiment.error.as_ref().map(|e| e.kind),
            Some(TaskErrorKind::RateLimited)
        );
    }
}
