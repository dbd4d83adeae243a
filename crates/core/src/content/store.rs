//! Content storage trait.

use crate::enricher::ItemEnrichmentResult;

use super::types::{ContentCounts, ContentItem, ContentQuery, ContentType, NewContentItem};

/// Error type for content store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        StoreError::Database(e.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        StoreError::Serialization(e.to_string())
    }
}

/// Source of items to enrich and sink for their results.
///
/// An item counts as pending when it has no stored result or its stored
/// result is `failed`. Skipped, partial and successful results are final
/// unless a query asks to reprocess.
pub trait ContentStore: Send + Sync {
    /// Add an item, assigning its id.
    fn insert(&self, item: NewContentItem) -> Result<ContentItem, StoreError>;

    fn get(&self, content_type: ContentType, id: i64) -> Result<Option<ContentItem>, StoreError>;

    /// Items selected by `query`, ordered by id ascending.
    fn pending(&self, query: &ContentQuery) -> Result<Vec<ContentItem>, StoreError>;

    /// Store a result, replacing any earlier one for the same item.
    fn save_result(&self, result: &ItemEnrichmentResult) -> Result<(), StoreError>;

    fn get_result(
        &self,
        content_type: ContentType,
        item_id: i64,
    ) -> Result<Option<ItemEnrichmentResult>, StoreError>;

    fn counts(&self, content_type: ContentType) -> Result<ContentCounts, StoreError>;
}
