//! Item-level enrichment: fan-out over analysis tasks and aggregation.

mod config;
mod item;
mod types;

pub use config::ItemEnricherConfig;
pub use item::ItemEnricher;
pub use types::{ItemEnrichmentResult, ItemStatus};
