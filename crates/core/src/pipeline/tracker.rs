//! Pipeline state machine, one per content type.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use crate::batch::BatchStatistics;
use crate::content::ContentType;

use super::error::PipelineError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineState {
    Idle,
    Running,
    Completed,
    Failed,
}

impl PipelineState {
    pub fn as_str(&self) -> &'static str {
        match self {
            PipelineState::Idle => "idle",
            PipelineState::Running => "running",
            PipelineState::Completed => "completed",
            PipelineState::Failed => "failed",
        }
    }
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Snapshot of one pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineStatus {
    pub content_type: ContentType,
    pub state: PipelineState,
    /// Identifier of the current or last run.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_id: Option<Uuid>,
    /// Statistics of the last completed run.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_statistics: Option<BatchStatistics>,
    /// Error of the last failed run.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    /// Time of the last transition.
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    /// Runs started since the process came up.
    pub runs: u64,
}

impl PipelineStatus {
    fn idle(content_type: ContentType) -> Self {
        Self {
            content_type,
            state: PipelineState::Idle,
            run_id: None,
            last_statistics: None,
            last_error: None,
            updated_at: Utc::now(),
            started_at: None,
            runs: 0,
        }
    }
}

/// Registry of pipeline states.
///
/// `start` refuses a second concurrent run of the same content type
/// instead of queuing it. Item failures never move a pipeline to
/// `failed`; only orchestration errors do.
pub struct PipelineStateTracker {
    states: Mutex<HashMap<ContentType, PipelineStatus>>,
}

impl Default for PipelineStateTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl PipelineStateTracker {
    pub fn new() -> Self {
        let states = ContentType::ALL
            .into_iter()
            .map(|ct| (ct, PipelineStatus::idle(ct)))
            .collect();
        Self {
            states: Mutex::new(states),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<ContentType, PipelineStatus>> {
        // Every transition is a single assignment, so a poisoned map is still consistent.
        self.states.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// `idle | completed | failed -> running`.
    pub fn start(&self, content_type: ContentType) -> Result<(), PipelineError> {
        let mut states = self.lock();
        let status = states
            .entry(content_type)
            .or_insert_with(|| PipelineStatus::idle(content_type));
        if status.state == PipelineState::Running {
            return Err(PipelineError::AlreadyRunning(content_type));
        }
        let now = Utc::now();
        status.state = PipelineState::Running;
        status.started_at = Some(now);
        status.updated_at = now;
        status.runs += 1;
        status.run_id = Some(Uuid::new_v4());
        info!(
            content_type = %content_type,
            run = status.runs,
            run_id = ?status.run_id,
            "Pipeline started"
        );
        Ok(())
    }

    /// `running -> completed`, keeping the final statistics.
    pub fn complete(
        &self,
        content_type: ContentType,
        statistics: BatchStatistics,
    ) -> Result<(), PipelineError> {
        let mut states = self.lock();
        let status = Self::running(&mut states, content_type)?;
        status.state = PipelineState::Completed;
        status.last_statistics = Some(statistics);
        status.last_error = None;
        status.updated_at = Utc::now();
        info!(content_type = %content_type, "Pipeline completed");
        Ok(())
    }

    /// `running -> failed`, keeping the error.
    pub fn fail(&self, content_type: ContentType, error: impl Into<String>) -> Result<(), PipelineError> {
        let mut states = self.lock();
        let status = Self::running(&mut states, content_type)?;
        let error = error.into();
        warn!(content_type = %content_type, error = %error, "Pipeline failed");
        status.state = PipelineState::Failed;
        status.last_error = Some(error);
        status.updated_at = Utc::now();
        Ok(())
    }

    fn running(
        states: &mut HashMap<ContentType, PipelineStatus>,
        content_type: ContentType,
    ) -> Result<&mut PipelineStatus, PipelineError> {
        match states.get_mut(&content_type) {
            Some(status) if status.state == PipelineState::Running => Ok(status),
            _ => Err(PipelineError::NotRunning(content_type)),
        }
    }

    pub fn status(&self, content_type: ContentType) -> PipelineStatus {
        self.lock()
            .get(&content_type)
            .cloned()
            .unwrap_or_else(|| PipelineStatus::idle(content_type))
    }

    /// Status of every content type, in pipeline order.
    pub fn all(&self) -> Vec<PipelineStatus> {
        let states = self.lock();
        ContentType::ALL
            .into_iter()
            .map(|ct| {
                states
                    .get(&ct)
                    .cloned()
                    .unwrap_or_else(|| PipelineStatus::idle(ct))
            })
            .collect()
    }

    pub fn is_running(&self, content_type: ContentType) -> bool {
        self.status(content_type).state == PipelineState::Running
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_state_is_idle() {
        let tracker = PipelineStateTracker::new();
        let all = tracker.all();
        assert_eq!(all.len(), 3);
        assert!(all.iter().all(|s| s.state == PipelineState::Idle && s.runs == 0));
    }

    #[test]
    fn test_lifecycle() {
        let tracker = PipelineStateTracker::new();

        tracker.start(ContentType::Article).unwrap();
        assert!(tracker.is_running(ContentType::Article));
        assert!(!tracker.is_running(ContentType::Post));

        let stats = BatchStatistics::empty(ContentType::Article);
        tracker.complete(ContentType::Article, stats.clone()).unwrap();
        let status = tracker.status(ContentType::Article);
        assert_eq!(status.state, PipelineState::Completed);
        assert_eq!(status.last_statistics, Some(stats));

        tracker.start(ContentType::Article).unwrap();
        tracker.fail(ContentType::Article, "rate limiter unavailable").unwrap();
        let status = tracker.status(ContentType::Article);
        assert_eq!(status.state, PipelineState::Failed);
        assert_eq!(status.last_error.as_deref(), Some("rate limiter unavailable"));
        assert_eq!(status.runs, 2);

        tracker.start(ContentType::Article).unwrap();
        assert!(tracker.is_running(ContentType::Article));
    }

    #[test]
    fn test_concurrent_start_is_rejected() {
        let tracker = PipelineStateTracker::new();
        tracker.start(ContentType::Comment).unwrap();

        let err = tracker.start(ContentType::Comment).unwrap_err();
        assert!(matches!(err, PipelineError::AlreadyRunning(ContentType::Comment)));
        assert_eq!(tracker.status(ContentType::Comment).runs, 1);
    }

    #[test]
    fn test_each_run_gets_a_new_id() {
        let tracker = PipelineStateTracker::new();
        assert!(tracker.status(ContentType::Post).run_id.is_none());

        tracker.start(ContentType::Post).unwrap();
        let first = tracker.status(ContentType::Post).run_id.unwrap();
        tracker.fail(ContentType::Post, "boom").unwrap();
        assert_eq!(tracker.status(ContentType::Post).run_id, Some(first));

        tracker.start(ContentType::Post).unwrap();
        assert_ne!(tracker.status(ContentType::Post).run_id, Some(first));
    }

    #[test]
    fn test_finish_requires_running() {
        let tracker = PipelineStateTracker::new();
        assert!(matches!(
            tracker.complete(ContentType::Post, BatchStatistics::empty(ContentType::Post)),
            Err(PipelineError::NotRunning(ContentType::Post))
        ));
        assert!(tracker.fail(ContentType::Post, "boom").is_err());
        assert_eq!(tracker.status(ContentType::Post).state, PipelineState::Idle);
    }
}
