//! Item enricher configuration.

use std::time::Duration;

use crate::analysis::{AnalysisTaskKind, TaskLimits};

/// How items of one content type are enriched.
#[derive(Debug, Clone, PartialEq)]
pub struct ItemEnricherConfig {
    /// Items with fewer characters (after trimming) are skipped.
    pub min_content_length: usize,
    /// Text sent to the provider is truncated to this many characters.
    pub max_content_length: usize,
    pub task_timeout: Duration,
    /// Deadline for all tasks of one item. Never shorter than the task timeout.
    pub item_timeout: Duration,
    pub tasks: Vec<AnalysisTaskKind>,
}

impl Default for ItemEnricherConfig {
    fn default() -> Self {
        Self {
            min_content_length: 20,
            max_content_length: 4000,
            task_timeout: Duration::from_secs(30),
            item_timeout: Duration::from_secs(60),
            tasks: AnalysisTaskKind::ALL.to_vec(),
        }
    }
}

impl ItemEnricherConfig {
    pub fn item_timeout(&self) -> Duration {
        self.item_timeout.max(self.task_timeout)
    }

    pub fn task_limits(&self) -> TaskLimits {
        TaskLimits {
            max_input_chars: self.max_content_length,
            timeout: self.task_timeout,
        }
    }

    /// Enabled tasks in configured order, without duplicates.
    pub fn enabled_tasks(&self) -> Vec<AnalysisTaskKind> {
        let mut tasks = Vec::with_capacity(self.tasks.len());
        for kind in &self.tasks {
            if !tasks.contains(kind) {
                tasks.push(*kind);
            }
        }
        tasks
    }

    pub fn with_min_content_length(mut self, length: usize) -> Self {
        self.min_content_length = length;
        self
    }

    pub fn with_max_content_length(mut self, length: usize) -> Self {
        self.max_content_length = length;
        self
    }

    pub fn with_tasks(mut self, tasks: Vec<AnalysisTaskKind>) -> Self {
        self.tasks = tasks;
        self
    }

    pub fn with_timeouts(mut self, task_timeout: Duration, item_timeout: Duration) -> Self {
        self.task_timeout = task_timeout;
        self.item_timeout = item_timeout;
        self
    }
}
