//! Built-in analysis tasks.

mod category;
mod entities;
mod keywords;
mod sentiment;

use std::sync::Arc;

pub use category::CategoryTask;
pub use entities::EntitiesTask;
pub use keywords::KeywordsTask;
pub use sentiment::SentimentTask;

use super::config::TaskRunnerConfig;
use super::task::AnalysisTask;
use super::types::AnalysisTaskKind;

/// Build the task implementation for `kind`.
pub fn build_task(kind: AnalysisTaskKind, config: &TaskRunnerConfig) -> Arc<dyn AnalysisTask> {
    let sampling = config.sampling(kind);
    match kind {
        AnalysisTaskKind::Sentiment => Arc::new(SentimentTask::new(sampling)),
        AnalysisTaskKind::Entities => Arc::new(EntitiesTask::new(
            sampling,
            config.max_entities,
            config.min_term_length,
        )),
        AnalysisTaskKind::Keywords => Arc::new(KeywordsTask::new(
            sampling,
            config.max_keywords,
            config.min_keyword_importance,
            config.min_term_length,
        )),
        AnalysisTaskKind::Category => {
            Arc::new(CategoryTask::new(sampling, config.max_secondary_categories))
        }
    }
}
