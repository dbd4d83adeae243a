//! Pipeline errors.

use crate::batch::OrchestrationError;
use crate::content::{ContentType, StoreError};

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("Pipeline already running for {0}")]
    AlreadyRunning(ContentType),

    #[error("Pipeline for {0} is disabled")]
    Disabled(ContentType),

    #[error("Pipeline for {0} is not running")]
    NotRunning(ContentType),

    #[error("Content store error: {0}")]
    Store(#[from] StoreError),

    #[error("Orchestration failed: {0}")]
    Orchestration(#[from] OrchestrationError),
}
