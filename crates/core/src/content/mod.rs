//! Content items and the store they are read from and written back to.

mod sqlite_store;
mod store;
mod types;

pub use sqlite_store::SqliteContentStore;
pub use store::{ContentStore, StoreError};
pub use types::{
    ContentCounts, ContentItem, ContentQuery, ContentType, NewContentItem, UnknownContentType,
};
