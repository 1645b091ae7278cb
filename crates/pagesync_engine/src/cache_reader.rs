//! Paged read view over the local store.

use crate::model::Page;
use pagesync_store::{CachedRecord, LocalStore};
use std::sync::Arc;

/// Reads cached records in presentation order, keyed by row offset.
///
/// Rows are ordered by page ascending, then by fetch order within a page.
/// A page's `prev_key` is the offset its predecessor ends at and its
/// `next_key` the offset its successor starts at; either is `None` at the
/// edge of the table.
#[derive(Debug, Clone)]
pub struct CacheReader {
    store: Arc<LocalStore>,
}

impl CacheReader {
    /// Creates a reader over `store`.
    pub fn new(store: Arc<LocalStore>) -> Self {
        Self { store }
    }

    /// Reads up to `limit` rows starting at `offset`.
    pub fn load(&self, offset: usize, limit: usize) -> Page<usize, CachedRecord> {
        let window = self.store.read_window(offset, limit);
        let end = offset.saturating_add(window.rows.len());
        let prev_key = (offset > 0 && window.total > 0).then(|| offset.min(window.total));
        let next_key = (end < window.total).then_some(end);
        Page::new(window.rows, prev_key, next_key)
    }

    /// Returns the number of cached rows.
    pub fn row_count(&self) -> usize {
        self.store.record_count()
    }
}
