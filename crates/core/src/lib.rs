pub mod analysis;
pub mod batch;
pub mod config;
pub mod content;
pub mod enricher;
pub mod llm;
pub mod metrics;
pub mod pipeline;
pub mod ratelimit;
pub mod testing;

pub use analysis::{AnalysisTaskKind, TaskError, TaskResult, TaskRunner, TaskRunnerConfig};
pub use batch::{BatchConfig, BatchOrchestrator, BatchStatistics, OrchestrationError};
pub use config::{
    load_config, load_config_from_str, validate_config, Config, ConfigError, SanitizedConfig,
};
pub use content::{
    ContentItem, ContentQuery, ContentStore, ContentType, NewContentItem, SqliteContentStore,
    StoreError,
};
pub use enricher::{ItemEnricher, ItemEnricherConfig, ItemEnrichmentResult, ItemStatus};
pub use llm::{create_llm_client, LlmClient, LlmConfig, LlmError, LlmProvider};
pub use pipeline::{
    ContentSettings, EnrichmentService, PipelineError, PipelineState, PipelineStatus, RunRequest,
};
pub use ratelimit::{RateLimitError, RateLimiter, RateLimiterConfig};
