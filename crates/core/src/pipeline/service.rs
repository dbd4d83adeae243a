//! Per-content-type wiring of store, enricher, orchestrator and tracker.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::analysis::TaskRunner;
use crate::batch::{BatchOrchestrator, BatchStatistics, ItemCallback};
use crate::config::Config;
use crate::content::{ContentCounts, ContentItem, ContentQuery, ContentStore, ContentType};
use crate::enricher::{ItemEnricher, ItemEnrichmentResult};
use crate::llm::{LlmClient, LlmError};
use crate::metrics;
use crate::ratelimit::RateLimiter;

use super::config::ContentSettings;
use super::error::PipelineError;
use super::tracker::{PipelineStateTracker, PipelineStatus};

/// Which items a run picks up.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ids: Option<Vec<i64>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub since: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub until: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,
    /// Reprocess items that already have a final result.
    #[serde(default)]
    pub force_reprocess: bool,
}

impl RunRequest {
    pub fn query(&self, content_type: ContentType) -> ContentQuery {
        ContentQuery {
            content_type,
            ids: self.ids.clone(),
            since: self.since,
            until: self.until,
            limit: self.limit,
            force_reprocess: self.force_reprocess,
        }
    }
}

struct Enrichers {
    article: Arc<ItemEnricher>,
    post: Arc<ItemEnricher>,
    comment: Arc<ItemEnricher>,
}

impl Enrichers {
    fn get(&self, content_type: ContentType) -> &Arc<ItemEnricher> {
        match content_type {
            ContentType::Article => &self.article,
            ContentType::Post => &self.post,
            ContentType::Comment => &self.comment,
        }
    }
}

#[derive(Clone)]
struct ActiveRun {
    cancel: CancellationToken,
    orchestrator: Arc<BatchOrchestrator>,
}

/// Runs the enrichment pipelines of all content types.
pub struct EnrichmentService {
    store: Arc<dyn ContentStore>,
    runner: Arc<TaskRunner>,
    limiter: Arc<RateLimiter>,
    settings: ContentSettings,
    enrichers: Enrichers,
    tracker: PipelineStateTracker,
    active: Mutex<HashMap<ContentType, ActiveRun>>,
    shutdown: CancellationToken,
}

impl EnrichmentService {
    pub fn new(
        store: Arc<dyn ContentStore>,
        runner: Arc<TaskRunner>,
        limiter: Arc<RateLimiter>,
        settings: ContentSettings,
    ) -> Self {
        let build = |ct: ContentType| {
            Arc::new(ItemEnricher::new(
                Arc::clone(&runner),
                settings.get(ct).enricher_config(),
            ))
        };
        let enrichers = Enrichers {
            article: build(ContentType::Article),
            post: build(ContentType::Post),
            comment: build(ContentType::Comment),
        };

        Self {
            store,
            runner,
            limiter,
            settings,
            enrichers,
            tracker: PipelineStateTracker::new(),
            active: Mutex::new(HashMap::new()),
            shutdown: CancellationToken::new(),
        }
    }

    /// Wire the limiter and task runner described by `config`.
    pub fn from_config(
        config: &Config,
        client: Arc<dyn LlmClient>,
        store: Arc<dyn ContentStore>,
    ) -> Self {
        let limiter = Arc::new(RateLimiter::new(&config.rate_limit));
        let runner = TaskRunner::new(client, Arc::clone(&limiter), &config.tasks)
            .with_acquire_timeout(config.rate_limit.acquire_timeout());
        Self::new(store, Arc::new(runner), limiter, config.content.clone())
    }

    pub fn settings(&self) -> &ContentSettings {
        &self.settings
    }

    pub fn provider(&self) -> &str {
        self.runner.provider()
    }

    pub fn model(&self) -> &str {
        self.runner.model()
    }

    /// Check that the analysis provider answers.
    pub async fn provider_health(&self) -> Result<(), LlmError> {
        self.runner.health_check().await
    }

    pub fn store(&self) -> &Arc<dyn ContentStore> {
        &self.store
    }

    pub fn limiter(&self) -> &Arc<RateLimiter> {
        &self.limiter
    }

    fn active(&self) -> MutexGuard<'_, HashMap<ContentType, ActiveRun>> {
        self.active.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn enricher(&self, content_type: ContentType) -> Arc<ItemEnricher> {
        Arc::clone(self.enrichers.get(content_type))
    }

    /// Fail fast for disabled types or a run already in progress.
    pub fn check_runnable(&self, content_type: ContentType) -> Result<(), PipelineError> {
        if !self.settings.get(content_type).enabled {
            return Err(PipelineError::Disabled(content_type));
        }
        if self.tracker.is_running(content_type) {
            return Err(PipelineError::AlreadyRunning(content_type));
        }
        Ok(())
    }

    /// Run the pipeline of one content type to completion.
    ///
    /// Item outcomes are persisted as they complete. A cancelled run still
    /// completes the pipeline, with `cancelled` set in its statistics.
    pub async fn run(
        &self,
        content_type: ContentType,
        request: RunRequest,
    ) -> Result<BatchStatistics, PipelineError> {
        let run = self.begin(content_type)?;
        self.drive(content_type, request, run).await
    }

    /// Start a run in the background. The pipeline is already `running`
    /// when this returns, so a second call fails with `AlreadyRunning`.
    pub fn spawn_run(
        self: &Arc<Self>,
        content_type: ContentType,
        request: RunRequest,
    ) -> Result<JoinHandle<Result<BatchStatistics, PipelineError>>, PipelineError> {
        let run = self.begin(content_type)?;
        let service = Arc::clone(self);
        Ok(tokio::spawn(async move {
            service.drive(content_type, request, run).await
        }))
    }

    fn begin(&self, content_type: ContentType) -> Result<ActiveRun, PipelineError> {
        let settings = self.settings.get(content_type);
        if !settings.enabled {
            return Err(PipelineError::Disabled(content_type));
        }
        self.tracker.start(content_type)?;

        let run = ActiveRun {
            cancel: self.shutdown.child_token(),
            orchestrator: Arc::new(
                BatchOrchestrator::new(
                    self.enricher(content_type),
                    Arc::clone(&self.limiter),
                    settings.batch.clone(),
                )
                .with_item_callback(self.persist_callback()),
            ),
        };
        self.active().insert(content_type, run.clone());
        Ok(run)
    }

    async fn drive(
        &self,
        content_type: ContentType,
        request: RunRequest,
        run: ActiveRun,
    ) -> Result<BatchStatistics, PipelineError> {
        let guard = RunGuard {
            service: self,
            content_type,
            finished: false,
        };
        let outcome = self
            .execute(content_type, &request, &run.orchestrator, &run.cancel)
            .await;
        guard.finish(outcome)
    }

    async fn execute(
        &self,
        content_type: ContentType,
        request: &RunRequest,
        orchestrator: &BatchOrchestrator,
        cancel: &CancellationToken,
    ) -> Result<BatchStatistics, PipelineError> {
        let items = self.store.pending(&request.query(content_type))?;
        info!(
            content_type = %content_type,
            pending = items.len(),
            force_reprocess = request.force_reprocess,
            "Loaded items for enrichment"
        );
        Ok(orchestrator.run(content_type, items, cancel).await?)
    }

    fn persist_callback(&self) -> ItemCallback {
        let store = Arc::clone(&self.store);
        Arc::new(move |result: &ItemEnrichmentResult| {
            if let Err(e) = store.save_result(result) {
                warn!(
                    item_id = result.item_id,
                    content_type = %result.content_type,
                    error = %e,
                    "Failed to persist enrichment result"
                );
                metrics::STORE_WRITE_FAILURES
                    .with_label_values(&[result.content_type.as_str()])
                    .inc();
            }
        })
    }

    /// Run every enabled content type in order: article, post, comment.
    pub async fn run_all(
        &self,
        request: RunRequest,
    ) -> Vec<(ContentType, Result<BatchStatistics, PipelineError>)> {
        let mut outcomes = Vec::new();
        for content_type in self.settings.enabled_types() {
            if self.shutdown.is_cancelled() {
                break;
            }
            let outcome = self.run(content_type, request.clone()).await;
            outcomes.push((content_type, outcome));
        }
        outcomes
    }

    /// Cancel the active run of `content_type`. Returns whether one was active.
    pub fn cancel(&self, content_type: ContentType) -> bool {
        match self.active().get(&content_type) {
            Some(run) => {
                info!(content_type = %content_type, "Cancelling pipeline run");
                run.cancel.cancel();
                true
            }
            None => false,
        }
    }

    /// Cancel every active run.
    pub fn cancel_all(&self) {
        for (content_type, run) in self.active().iter() {
            info!(content_type = %content_type, "Cancelling pipeline run");
            run.cancel.cancel();
        }
    }

    /// Cancel active runs and make any later run stop before its first batch.
    pub fn shutdown(&self) {
        info!("Shutting down enrichment pipelines");
        self.cancel_all();
        self.shutdown.cancel();
    }

    /// Interim statistics of the active run of `content_type`.
    pub fn progress(&self, content_type: ContentType) -> Option<BatchStatistics> {
        self.active()
            .get(&content_type)
            .and_then(|run| run.orchestrator.progress())
    }

    pub fn status(&self) -> Vec<PipelineStatus> {
        self.tracker.all()
    }

    pub fn status_of(&self, content_type: ContentType) -> PipelineStatus {
        self.tracker.status(content_type)
    }

    /// Enrich one item without persisting the result.
    pub async fn enrich_one(&self, item: &ContentItem) -> ItemEnrichmentResult {
        self.enricher(item.content_type).enrich(item).await
    }

    pub fn counts(&self, content_type: ContentType) -> Result<ContentCounts, PipelineError> {
        Ok(self.store.counts(content_type)?)
    }
}

/// Settles the tracker and the active-run registry when a run ends,
/// including when the run future is dropped before finishing.
struct RunGuard<'a> {
    service: &'a EnrichmentService,
    content_type: ContentType,
    finished: bool,
}

impl RunGuard<'_> {
    fn finish(
        mut self,
        outcome: Result<BatchStatistics, PipelineError>,
    ) -> Result<BatchStatistics, PipelineError> {
        self.finished = true;
        let content_type = self.content_type;
        let tracker = &self.service.tracker;
        self.service.active().remove(&content_type);

        let recorded = match outcome {
            Ok(ref stats) => {
                let result = if stats.cancelled { "cancelled" } else { "completed" };
                metrics::PIPELINE_RUNS
                    .with_label_values(&[content_type.as_str(), result])
                    .inc();
                tracker.complete(content_type, stats.clone())
            }
            Err(ref e) => {
                metrics::PIPELINE_RUNS
                    .with_label_values(&[content_type.as_str(), "failed"])
                    .inc();
                tracker.fail(content_type, e.to_string())
            }
        };
        if let Err(e) = recorded {
            warn!(content_type = %content_type, error = %e, "Pipeline state out of sync");
        }
        outcome
    }
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        self.service.active().remove(&self.content_type);
        let _ = self
            .service
            .tracker
            .fail(self.content_type, "run aborted before completion");
    }
}
