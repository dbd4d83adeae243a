//! Executes one analysis task against the provider.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::content::ContentType;
use crate::llm::{extract_json, CompletionRequest, LlmClient, LlmError};
use crate::metrics;
use crate::ratelimit::{RateLimitError, RateLimiter};

use super::config::TaskRunnerConfig;
use super::preprocess::preprocess;
use super::task::AnalysisTask;
use super::tasks::build_task;
use super::types::{
    AnalysisTaskKind, TaskError, TaskErrorKind, TaskMetadata, TaskResult, TaskStatus,
};

/// Text and hints for one task invocation.
#[derive(Debug, Clone)]
pub struct TaskInput {
    pub text: String,
    pub content_type: ContentType,
    pub language_hint: Option<String>,
}

/// Per-content-type bounds applied to each task.
#[derive(Debug, Clone, Copy)]
pub struct TaskLimits {
    pub max_input_chars: usize,
    pub timeout: Duration,
}

/// Runs analysis tasks through the rate limiter and the provider.
///
/// `run` never returns an error: every failure is folded into a
/// [`TaskResult`] with status `failed` (or `skipped` for empty input).
pub struct TaskRunner {
    client: Arc<dyn LlmClient>,
    limiter: Arc<RateLimiter>,
    tasks: HashMap<AnalysisTaskKind, Arc<dyn AnalysisTask>>,
    strip_markup: bool,
    acquire_timeout: Option<Duration>,
}

impl TaskRunner {
    pub fn new(
        client: Arc<dyn LlmClient>,
        limiter: Arc<RateLimiter>,
        config: &TaskRunnerConfig,
    ) -> Self {
        let tasks = AnalysisTaskKind::ALL
            .into_iter()
            .map(|kind| (kind, build_task(kind, config)))
            .collect();
        Self {
            client,
            limiter,
            tasks,
            strip_markup: config.strip_markup,
            acquire_timeout: None,
        }
    }

    /// Wait up to `timeout` for a rate limiter permit instead of failing at once.
    pub fn with_acquire_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.acquire_timeout = timeout;
        self
    }

    /// Replace the implementation of one task kind.
    pub fn with_task(mut self, task: Arc<dyn AnalysisTask>) -> Self {
        self.tasks.insert(task.kind(), task);
        self
    }

    pub fn provider(&self) -> &str {
        self.client.provider()
    }

    pub fn model(&self) -> &str {
        self.client.model()
    }

    /// Whether the provider is reachable. Takes no rate limiter permit.
    pub async fn health_check(&self) -> Result<(), LlmError> {
        self.client.health_check().await
    }

    pub async fn run(
        &self,
        kind: AnalysisTaskKind,
        input: &TaskInput,
        limits: &TaskLimits,
    ) -> TaskResult {
        let started = Instant::now();
        let result = self.execute(kind, input, limits, started).await;
        record_metrics(&result);
        result
    }

    async fn execute(
        &self,
        kind: AnalysisTaskKind,
        input: &TaskInput,
        limits: &TaskLimits,
        started: Instant,
    ) -> TaskResult {
        let prepared = preprocess(&input.text, limits.max_input_chars, self.strip_markup);
        let mut metadata = TaskMetadata {
            input_chars: prepared.chars(),
            original_chars: prepared.original_chars,
            truncated: prepared.truncated,
            model: Some(self.client.model().to_string()),
            usage: None,
        };

        if prepared.is_empty() {
            return TaskResult::skipped(
                kind,
                TaskError::new(TaskErrorKind::EmptyInput, "no text left after preprocessing"),
            )
            .with_metadata(metadata);
        }

        let Some(task) = self.tasks.get(&kind) else {
            return TaskResult::failed(
                kind,
                TaskError::new(TaskErrorKind::NotConfigured, "no implementation for task"),
                elapsed_ms(started),
            )
            .with_metadata(metadata);
        };

        if let Err(e) = self.acquire_permit(input.content_type).await {
            return TaskResult::failed(
                kind,
                TaskError::new(TaskErrorKind::RateLimited, e.to_string()),
                elapsed_ms(started),
            )
            .with_metadata(metadata);
        }

        let sampling = task.sampling();
        let request = CompletionRequest::new(
            task.build_prompt(&prepared.text, input.language_hint.as_deref()),
        )
        .with_system(task.system_prompt())
        .with_max_tokens(sampling.max_tokens)
        .with_temperature(sampling.temperature)
        .with_json_response();

        let response = match tokio::time::timeout(limits.timeout, self.client.complete(request))
            .await
        {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => {
                let error = provider_error(&e);
                warn!(
                    task = %kind,
                    content_type = %input.content_type,
                    error = %e,
                    "Provider call failed"
                );
                return TaskResult::failed(kind, error, elapsed_ms(started)).with_metadata(metadata);
            }
            Err(_) => {
                warn!(
                    task = %kind,
                    content_type = %input.content_type,
                    timeout_ms = limits.timeout.as_millis() as u64,
                    "Provider call timed out"
                );
                return TaskResult::failed(
                    kind,
                    TaskError::new(
                        TaskErrorKind::Timeout,
                        format!("no response within {:?}", limits.timeout),
                    ),
                    elapsed_ms(started),
                )
                .with_metadata(metadata);
            }
        };

        metrics::LLM_TOKENS
            .with_label_values(&[self.client.provider(), "input"])
            .inc_by(u64::from(response.usage.input_tokens));
        metrics::LLM_TOKENS
            .with_label_values(&[self.client.provider(), "output"])
            .inc_by(u64::from(response.usage.output_tokens));
        metadata.usage = Some(response.usage);
        metadata.model = Some(response.model.clone());

        let value = match extract_json(&response.text) {
            Ok(value) => value,
            Err(e) => {
                return TaskResult::failed(
                    kind,
                    TaskError::new(TaskErrorKind::MalformedResponse, e.to_string()),
                    elapsed_ms(started),
                )
                .with_raw_response(response.text)
                .with_metadata(metadata);
            }
        };

        let payload = match task.validate(&value) {
            Ok(payload) => payload,
            Err(reason) => {
                debug!(task = %kind, reason = %reason, "Response failed validation");
                return TaskResult::failed(
                    kind,
                    TaskError::new(TaskErrorKind::SchemaMismatch, reason),
                    elapsed_ms(started),
                )
                .with_raw_response(response.text)
                .with_metadata(metadata);
            }
        };

        let confidence = task.confidence(&payload);
        TaskResult::success(payload, confidence, elapsed_ms(started)).with_metadata(metadata)
    }

    async fn acquire_permit(&self, content_type: ContentType) -> Result<(), RateLimitError> {
        match self.acquire_timeout {
            Some(wait) => {
                let deadline = tokio::time::Instant::now() + wait;
                self.limiter.acquire_blocking(content_type, deadline).await
            }
            None => self.limiter.try_acquire(content_type),
        }
    }
}

fn provider_error(error: &LlmError) -> TaskError {
    let kind = match error {
        LlmError::Timeout(_) => TaskErrorKind::Timeout,
        LlmError::Http(_) => TaskErrorKind::Transport,
        LlmError::Api { .. } => TaskErrorKind::Api,
        LlmError::Json(_) => TaskErrorKind::MalformedResponse,
        LlmError::NotConfigured(_) => TaskErrorKind::NotConfigured,
    };
    TaskError::new(kind, error.to_string())
}

fn elapsed_ms(started: Instant) -> u64 {
    started.elapsed().as_millis() as u64
}

fn record_metrics(result: &TaskResult) {
    let task = result.kind.as_str();
    let status = match result.status {
        TaskStatus::Success => "success",
        TaskStatus::Failed => "failed",
        TaskStatus::Skipped => "skipped",
    };
    metrics::TASK_RESULTS.with_label_values(&[task, status]).inc();
    metrics::TASK_DURATION
        .with_label_values(&[task])
        .observe(result.duration_ms as f64 / 1000.0);
    if let Some(kind) = result.error_kind() {
        metrics::TASK_ERRORS
            .with_label_values(&[task, kind.as_str()])
            .inc();
    }
}
