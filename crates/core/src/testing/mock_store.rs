//! In-memory content store for testing.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};

use crate::content::{
    ContentCounts, ContentItem, ContentQuery, ContentStore, ContentType, NewContentItem,
    StoreError,
};
use crate::enricher::{ItemEnrichmentResult, ItemStatus};

#[derive(Default)]
struct State {
    next_id: i64,
    items: BTreeMap<i64, ContentItem>,
    results: BTreeMap<(ContentType, i64), ItemEnrichmentResult>,
}

/// Content store kept in memory, with switches to simulate failures.
///
/// # Example
///
/// ```rust,ignore
/// use enricher_core::testing::InMemoryContentStore;
///
/// let store = InMemoryContentStore::new();
/// store.insert(NewContentItem::new(ContentType::Post, "Some post text"))?;
/// store.fail_writes(true);
/// ```
#[derive(Default)]
pub struct InMemoryContentStore {
    state: Mutex<State>,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
    writes: AtomicUsize,
}

impl std::fmt::Debug for InMemoryContentStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryContentStore")
            .field("state", &"<state>")
            .field("fail_reads", &self.fail_reads.load(Ordering::SeqCst))
            .field("fail_writes", &self.fail_writes.load(Ordering::SeqCst))
            .finish()
    }
}

impl InMemoryContentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert `count` items of `content_type` with distinct, long enough text.
    pub fn seed(&self, content_type: ContentType, count: usize) -> Result<Vec<ContentItem>, StoreError> {
        (0..count)
            .map(|i| {
                self.insert(NewContentItem::new(
                    content_type,
                    format!(
                        "{} number {} discusses the regional economy and the new budget.",
                        content_type, i
                    ),
                ))
            })
            .collect()
    }

    /// Make every read fail with `StoreError::Unavailable`.
    pub fn fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    /// Make every write fail with `StoreError::Unavailable`.
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Number of successful `save_result` calls.
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    pub fn results(&self) -> Vec<ItemEnrichmentResult> {
        self.state()
            .map(|s| s.results.values().cloned().collect())
            .unwrap_or_default()
    }

    fn state(&self) -> Result<MutexGuard<'_, State>, StoreError> {
        self.state
            .lock()
            .map_err(|_| StoreError::Unavailable("state lock poisoned".to_string()))
    }

    fn check_reads(&self) -> Result<(), StoreError> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("simulated read failure".to_string()));
        }
        Ok(())
    }

    fn check_writes(&self) -> Result<(), StoreError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("simulated write failure".to_string()));
        }
        Ok(())
    }
}

impl ContentStore for InMemoryContentStore {
    fn insert(&self, item: NewContentItem) -> Result<ContentItem, StoreError> {
        self.check_writes()?;
        let mut state = self.state()?;
        state.next_id += 1;
        let item = ContentItem {
            id: state.next_id,
            content_type: item.content_type,
            text: item.text,
            language_hint: item.language_hint,
            published_at: item.published_at,
        };
        state.items.insert(item.id, item.clone());
        Ok(item)
    }

    fn get(&self, content_type: ContentType, id: i64) -> Result<Option<ContentItem>, StoreError> {
        self.check_reads()?;
        let state = self.state()?;
        Ok(state
            .items
            .get(&id)
            .filter(|i| i.content_type == content_type)
            .cloned())
    }

    fn pending(&self, query: &ContentQuery) -> Result<Vec<ContentItem>, StoreError> {
        self.check_reads()?;
        let state = self.state()?;
        let selected = state
            .items
            .values()
            .filter(|item| query.matches(item))
            .filter(|item| {
                query.force_reprocess
                    || state
                        .results
                        .get(&(item.content_type, item.id))
                        .map_or(true, |r| r.status == ItemStatus::Failed)
            })
            .take(query.limit.unwrap_or(usize::MAX))
            .cloned()
            .collect();
        Ok(selected)
    }

    fn save_result(&self, result: &ItemEnrichmentResult) -> Result<(), StoreError> {
        self.check_writes()?;
        let mut state = self.state()?;
        state
            .results
            .insert((result.content_type, result.item_id), result.clone());
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn get_result(
        &self,
        content_type: ContentType,
        item_id: i64,
    ) -> Result<Option<ItemEnrichmentResult>, StoreError> {
        self.check_reads()?;
        Ok(self.state()?.results.get(&(content_type, item_id)).cloned())
    }

    fn counts(&self, content_type: ContentType) -> Result<ContentCounts, StoreError> {
        self.check_reads()?;
        let state = self.state()?;
        let mut counts = ContentCounts::default();
        for item in state.items.values().filter(|i| i.content_type == content_type) {
            counts.total += 1;
            match state.results.get(&(content_type, item.id)).map(|r| r.status) {
                Some(ItemStatus::Failed) => {
                    counts.failed += 1;
                    counts.pending += 1;
                }
                Some(_) => counts.enriched += 1,
                None => counts.pending += 1,
            }
        }
        Ok(counts)
    }
}
