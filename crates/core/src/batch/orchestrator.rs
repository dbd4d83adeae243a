//! Batch orchestrator: sequential batches, bounded workers, item retries.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;

use futures::stream::{FuturesUnordered, StreamExt};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::content::{ContentItem, ContentType};
use crate::enricher::{ItemEnricher, ItemEnrichmentResult};
use crate::metrics;
use crate::ratelimit::RateLimiter;

use super::config::BatchConfig;
use super::error::OrchestrationError;
use super::stats::{BatchStatistics, StatsAccumulator};

/// Called once per item with its final result (after retries).
pub type ItemCallback = Arc<dyn Fn(&ItemEnrichmentResult) + Send + Sync>;

/// Drives one run over a list of items.
///
/// Batches run one after another with a pause in between; the items of a
/// batch go through a worker pool of `max_workers`. Cancellation lets
/// in-flight items finish but starts no new batch or worker.
pub struct BatchOrchestrator {
    enricher: Arc<ItemEnricher>,
    limiter: Arc<RateLimiter>,
    config: BatchConfig,
    on_item: Option<ItemCallback>,
    stats: Arc<Mutex<Option<StatsAccumulator>>>,
}

/// Everything a worker needs, shared across spawned tasks.
struct WorkerContext {
    enricher: Arc<ItemEnricher>,
    max_item_retries: u32,
    on_item: Option<ItemCallback>,
    stats: Arc<Mutex<Option<StatsAccumulator>>>,
    in_flight: AtomicUsize,
    cancel: CancellationToken,
}

impl BatchOrchestrator {
    pub fn new(enricher: Arc<ItemEnricher>, limiter: Arc<RateLimiter>, config: BatchConfig) -> Self {
        Self {
            enricher,
            limiter,
            config,
            on_item: None,
            stats: Arc::new(Mutex::new(None)),
        }
    }

    /// Register a callback invoked with every final item result.
    pub fn with_item_callback(mut self, callback: ItemCallback) -> Self {
        self.on_item = Some(callback);
        self
    }

    pub fn config(&self) -> &BatchConfig {
        &self.config
    }

    /// Statistics of the current (or last) run, if one was started.
    pub fn progress(&self) -> Option<BatchStatistics> {
        lock_stats(&self.stats).as_ref().map(StatsAccumulator::snapshot)
    }

    /// Process `items` of `content_type` and return the run statistics.
    ///
    /// Only orchestration faults return an error; every item outcome is
    /// folded into the statistics.
    pub async fn run(
        &self,
        content_type: ContentType,
        items: Vec<ContentItem>,
        cancel: &CancellationToken,
    ) -> Result<BatchStatistics, OrchestrationError> {
        self.config
            .validate()
            .map_err(OrchestrationError::InvalidConfig)?;

        let batch_count = self.config.batch_count(items.len());
        *lock_stats(&self.stats) = Some(StatsAccumulator::new(
            content_type,
            items.len(),
            batch_count,
        ));

        info!(
            content_type = %content_type,
            items = items.len(),
            batches = batch_count,
            batch_size = self.config.batch_size,
            workers = self.config.max_workers,
            "Starting batch run"
        );

        let context = Arc::new(WorkerContext {
            enricher: Arc::clone(&self.enricher),
            max_item_retries: self.config.max_item_retries,
            on_item: self.on_item.clone(),
            stats: Arc::clone(&self.stats),
            in_flight: AtomicUsize::new(0),
            cancel: cancel.clone(),
        });
        let pool = Arc::new(Semaphore::new(self.config.max_workers));

        let mut cancelled = false;
        let total_batches = batch_count;
        for (index, batch) in items.chunks(self.config.batch_size).enumerate() {
            if cancel.is_cancelled() {
                cancelled = true;
                break;
            }

            self.limiter.ensure_available()?;

            debug!(
                content_type = %content_type,
                batch = index + 1,
                of = total_batches,
                items = batch.len(),
                "Starting batch"
            );
            let started = Instant::now();
            let interrupted = run_batch(&context, &pool, batch).await?;

            if let Some(acc) = lock_stats(&self.stats).as_mut() {
                acc.batch_completed();
            }
            metrics::BATCHES_COMPLETED
                .with_label_values(&[content_type.as_str()])
                .inc();
            debug!(
                content_type = %content_type,
                batch = index + 1,
                duration_ms = started.elapsed().as_millis() as u64,
                "Batch finished"
            );

            if interrupted {
                cancelled = true;
                break;
            }

            if index + 1 < total_batches {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        cancelled = true;
                        break;
                    }
                    _ = tokio::time::sleep(self.config.inter_batch_delay()) => {}
                }
            }
        }

        let stats = lock_stats(&self.stats)
            .as_mut()
            .map(|acc| acc.finish(cancelled))
            .ok_or_else(|| OrchestrationError::WorkerPool("run statistics missing".to_string()))?;

        info!(
            content_type = %content_type,
            total = stats.total_items,
            processed = stats.processed_items,
            successful = stats.successful_items,
            failed = stats.failed_items,
            skipped = stats.skipped_items,
            cancelled = stats.cancelled,
            duration_ms = stats.total_duration_ms,
            "Batch run finished"
        );
        Ok(stats)
    }
}

/// Run one batch through the worker pool. Returns whether cancellation
/// stopped workers from being started.
async fn run_batch(
    context: &Arc<WorkerContext>,
    pool: &Arc<Semaphore>,
    batch: &[ContentItem],
) -> Result<bool, OrchestrationError> {
    let mut workers = FuturesUnordered::new();
    let mut interrupted = false;

    for item in batch {
        let permit = tokio::select! {
            biased;
            _ = context.cancel.cancelled() => {
                interrupted = true;
                break;
            }
            permit = Arc::clone(pool).acquire_owned() => {
                permit.map_err(|e| OrchestrationError::WorkerPool(e.to_string()))?
            }
        };

        let worker = tokio::spawn(process_item(Arc::clone(context), item.clone(), permit));
        let item = item.clone();
        workers.push(async move { (item, worker.await) });
    }

    while let Some((item, outcome)) = workers.next().await {
        if let Err(e) = outcome {
            error!(item_id = item.id, error = %e, "Worker terminated abnormally");
            let result = ItemEnrichmentResult::failed(
                &item,
                format!("worker terminated: {}", e),
                std::time::Duration::ZERO,
            );
            deliver(context, &result);
        }
    }

    Ok(interrupted)
}

/// Decrements the in-flight counter however the worker exits.
struct InFlight<'a>(&'a AtomicUsize);

impl<'a> InFlight<'a> {
    fn enter(counter: &'a AtomicUsize) -> (Self, usize) {
        let current = counter.fetch_add(1, Ordering::SeqCst) + 1;
        (Self(counter), current)
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Hand a final item result to the item callback, then count it.
fn deliver(context: &WorkerContext, result: &ItemEnrichmentResult) {
    if let Some(ref callback) = context.on_item {
        if catch_unwind(AssertUnwindSafe(|| callback(result))).is_err() {
            error!(
                item_id = result.item_id,
                content_type = %result.content_type,
                "Item callback panicked"
            );
        }
    }
    if let Some(acc) = lock_stats(&context.stats).as_mut() {
        acc.record(result);
    }
}

/// Enrich one item, retrying retryable failures, then report it.
async fn process_item(
    context: Arc<WorkerContext>,
    item: ContentItem,
    _permit: OwnedSemaphorePermit,
) {
    let (_in_flight, in_flight) = InFlight::enter(&context.in_flight);
    if let Some(acc) = lock_stats(&context.stats).as_mut() {
        acc.observe_concurrency(in_flight);
    }

    let mut attempt = 1;
    let result = loop {
        let started = Instant::now();
        let enricher = Arc::clone(&context.enricher);
        let input = item.clone();

        // A separate task per attempt so a panic only costs this attempt.
        let result = match tokio::spawn(async move { enricher.enrich(&input).await }).await {
            Ok(result) => result,
            Err(e) => {
                error!(
                    item_id = item.id,
                    content_type = %item.content_type,
                    attempt,
                    error = %e,
                    "Item enrichment crashed"
                );
                ItemEnrichmentResult::failed(
                    &item,
                    format!("enrichment crashed: {}", e),
                    started.elapsed(),
                )
            }
        };

        if result.is_retryable()
            && attempt <= context.max_item_retries
            && !context.cancel.is_cancelled()
        {
            warn!(
                item_id = item.id,
                content_type = %item.content_type,
                attempt,
                error = result.error_message.as_deref().unwrap_or("unknown"),
                "Retrying failed item"
            );
            metrics::ITEM_RETRIES
                .with_label_values(&[item.content_type.as_str()])
                .inc();
            if let Some(acc) = lock_stats(&context.stats).as_mut() {
                acc.record_retry();
            }
            attempt += 1;
            continue;
        }
        break result.with_attempts(attempt);
    };

    deliver(&context, &result);
}

fn lock_stats(
    stats: &Mutex<Option<StatsAccumulator>>,
) -> MutexGuard<'_, Option<StatsAccumulator>> {
    // Accumulator updates cannot leave it inconsistent, so a poisoned lock is still usable.
    stats.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use crate::analysis::{AnalysisTaskKind, TaskRunner, TaskRunnerConfig};
    use crate::enricher::{ItemEnricherConfig, ItemStatus};
    use crate::llm::LlmError;
    use crate::ratelimit::RateLimiterConfig;
    use crate::testing::{fixtures, MockLlmClient, MockReply};

    fn orchestrator(client: Arc<MockLlmClient>, config: BatchConfig) -> BatchOrchestrator {
        let limiter = Arc::new(RateLimiter::new(&RateLimiterConfig::uniform(10_000)));
        let runner = TaskRunner::new(client, Arc::clone(&limiter), &TaskRunnerConfig::default());
        let enricher_config = ItemEnricherConfig::default()
            .with_tasks(vec![AnalysisTaskKind::Sentiment, AnalysisTaskKind::Category]);
        let enricher = ItemEnricher::new(Arc::new(runner), enricher_config);
        BatchOrchestrator::new(Arc::new(enricher), limiter, config)
    }

    fn fast_config() -> BatchConfig {
        BatchConfig::default()
            .with_batch_size(5)
            .with_max_workers(3)
            .with_inter_batch_delay_ms(10)
    }

    #[tokio::test]
    async fn test_processes_every_item() {
        let client = Arc::new(MockLlmClient::new());
        let orchestrator = orchestrator(Arc::clone(&client), fast_config());
        let cancel = CancellationToken::new();

        let stats = orchestrator
            .run(ContentType::Article, fixtures::items(ContentType::Article, 12), &cancel)
            .await
            .unwrap();

        assert_eq!(stats.total_items, 12);
        assert_eq!(stats.processed_items, 12);
        assert_eq!(stats.successful_items, 12);
        assert_eq!(stats.batches_total, 3);
        assert_eq!(stats.batches_completed, 3);
        assert!(!stats.cancelled);
        assert!(stats.peak_concurrency <= 3);
        assert_eq!(stats.per_task_counts[&AnalysisTaskKind::Category], 12);
        assert_eq!(client.call_count().await, 24);
    }

    #[tokio::test]
    async fn test_empty_input() {
        let client = Arc::new(MockLlmClient::new());
        let orchestrator = orchestrator(client, fast_config());

        let stats = orchestrator
            .run(ContentType::Post, vec![], &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(stats.total_items, 0);
        assert_eq!(stats.batches_total, 0);
        assert!(stats.is_finished());
    }

    #[tokio::test]
    async fn test_invalid_config_is_an_error() {
        let client = Arc::new(MockLlmClient::new());
        let orchestrator = orchestrator(client, fast_config().with_max_workers(0));

        let result = orchestrator
            .run(ContentType::Post, fixtures::items(ContentType::Post, 2), &CancellationToken::new())
            .await;

        assert!(matches!(result, Err(OrchestrationError::InvalidConfig(_))));
    }

    #[tokio::test]
    async fn test_item_failures_do_not_abort_run() {
        let client = Arc::new(MockLlmClient::new());
        client
            .set_handler(|_, request| {
                request
                    .prompt
                    .contains("Item 2 ")
                    .then(|| MockReply::Text("no json here".to_string()))
            })
            .await;
        let orchestrator = orchestrator(client, fast_config().with_max_item_retries(0));

        let stats = orchestrator
            .run(ContentType::Article, fixtures::items(ContentType::Article, 4), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(stats.processed_items, 4);
        assert_eq!(stats.failed_items, 1);
        assert_eq!(stats.successful_items, 3);
    }

    #[tokio::test]
    async fn test_retryable_failure_is_retried() {
        let client = Arc::new(MockLlmClient::new());
        for kind in [AnalysisTaskKind::Sentiment, AnalysisTaskKind::Category] {
            client
                .push_reply(kind, MockReply::Error(LlmError::Http("connection reset".to_string())))
                .await;
        }
        let results = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&results);
        let orchestrator = orchestrator(Arc::clone(&client), fast_config().with_max_workers(1))
            .with_item_callback(Arc::new(move |r: &ItemEnrichmentResult| {
                sink.lock().unwrap().push(r.clone());
            }));

        let stats = orchestrator
            .run(ContentType::Article, fixtures::items(ContentType::Article, 1), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(stats.retries, 1);
        assert_eq!(stats.successful_items, 1);
        let results = results.lock().unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].attempts, 2);
        assert_eq!(results[0].status, ItemStatus::Success);
    }

    #[tokio::test]
    async fn test_retries_are_bounded() {
        let client = Arc::new(MockLlmClient::new());
        client
            .fail_task(AnalysisTaskKind::Sentiment, LlmError::Http("down".to_string()))
            .await;
        client
            .fail_task(AnalysisTaskKind::Category, LlmError::Http("down".to_string()))
            .await;
        let orchestrator = orchestrator(Arc::clone(&client), fast_config().with_max_item_retries(2));

        let stats = orchestrator
            .run(ContentType::Article, fixtures::items(ContentType::Article, 1), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(stats.failed_items, 1);
        assert_eq!(stats.retries, 2);
        assert_eq!(client.call_count().await, 6);
    }

    #[tokio::test]
    async fn test_panicking_item_is_contained() {
        let client = Arc::new(MockLlmClient::new());
        client
            .set_handler(|_, request| {
                request
                    .prompt
                    .contains("Item 3 ")
                    .then(|| MockReply::Panic("provider client bug".to_string()))
            })
            .await;
        let orchestrator = orchestrator(client, fast_config().with_max_item_retries(1));

        let stats = orchestrator
            .run(ContentType::Article, fixtures::items(ContentType::Article, 5), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(stats.processed_items, 5);
        assert_eq!(stats.failed_items, 1);
        assert_eq!(stats.successful_items, 4);
        assert_eq!(stats.retries, 1);
    }

    #[tokio::test]
    async fn test_panicking_callback_is_contained() {
        let client = Arc::new(MockLlmClient::new());
        let delivered = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&delivered);
        let orchestrator = orchestrator(client, fast_config().with_max_workers(1))
            .with_item_callback(Arc::new(move |r: &ItemEnrichmentResult| {
                if r.item_id == 2 {
                    panic!("store exploded");
                }
                sink.lock().unwrap().push(r.item_id);
            }));

        let stats = orchestrator
            .run(ContentType::Article, fixtures::items(ContentType::Article, 5), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(stats.processed_items, 5);
        assert_eq!(stats.successful_items, 5);
        assert_eq!(stats.peak_concurrency, 1);
        let mut delivered = delivered.lock().unwrap().clone();
        delivered.sort();
        assert_eq!(delivered, vec![1, 3, 4, 5]);
    }

    #[tokio::test]
    async fn test_cancel_before_start() {
        let client = Arc::new(MockLlmClient::new());
        let orchestrator = orchestrator(Arc::clone(&client), fast_config());
        let cancel = CancellationToken::new();
        cancel.cancel();

        let stats = orchestrator
            .run(ContentType::Comment, fixtures::items(ContentType::Comment, 5), &cancel)
            .await
            .unwrap();

        assert!(stats.cancelled);
        assert_eq!(stats.processed_items, 0);
        assert_eq!(client.call_count().await, 0);
    }

    #[tokio::test]
    async fn test_progress_is_available_during_run() {
        let client = Arc::new(MockLlmClient::new());
        client.set_delay(Duration::from_millis(50)).await;
        let orchestrator = Arc::new(orchestrator(client, fast_config().with_max_workers(1)));
        assert!(orchestrator.progress().is_none());

        let running = Arc::clone(&orchestrator);
        let handle = tokio::spawn(async move {
            running
                .run(ContentType::Post, fixtures::items(ContentType::Post, 4), &CancellationToken::new())
                .await
        });

        tokio::time::sleep(Duration::from_millis(120)).await;
        let interim = orchestrator.progress().unwrap();
        assert_eq!(interim.total_items, 4);
        assert!(interim.processed_items < 4);
        assert!(!interim.is_finished());

        let stats = handle.await.unwrap().unwrap();
        assert_eq!(stats.processed_items, 4);
        assert_eq!(orchestrator.progress().unwrap().processed_items, 4);
    }
}
