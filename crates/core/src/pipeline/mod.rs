//! Pipelines: one state machine and one run at a time per content type.

mod config;
mod error;
mod service;
mod tracker;

pub use config::{ContentSettings, ContentTypeSettings};
pub use error::PipelineError;
pub use service::{EnrichmentService, RunRequest};
pub use tracker::{PipelineState, PipelineStateTracker, PipelineStatus};
