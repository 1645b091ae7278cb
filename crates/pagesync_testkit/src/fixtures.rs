//! Test fixtures and store helpers.
//!
//! Provides convenience functions for setting up test stores and paging
//! sessions.

use pagesync_engine::{Pager, PagerConfig, SyntheticFetcher};
use pagesync_storage::FileBackend;
use pagesync_store::{LocalStore, Record, RemoteKey, StoreConfig};
use std::path::PathBuf;
use std::sync::Arc;
use tempfile::TempDir;

/// File name of the journal inside a file-backed test store.
pub const JOURNAL_FILE: &str = "cache.journal";

/// A test store with automatic cleanup.
pub struct TestStore {
    /// The store instance.
    pub store: Arc<LocalStore>,
    /// The temporary directory (kept alive to prevent cleanup).
    _temp_dir: Option<TempDir>,
}

impl TestStore {
    /// Creates a new in-memory test store.
    pub fn memory() -> Self {
        Self {
            store: Arc::new(LocalStore::in_memory()),
            _temp_dir: None,
        }
    }

    /// Creates a new file-backed test store.
    pub fn file() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let store = open_file_store(&temp_dir.path().join(JOURNAL_FILE));
        Self {
            store: Arc::new(store),
            _temp_dir: Some(temp_dir),
        }
    }

    /// Returns the journal path if file-backed, None if in-memory.
    pub fn path(&self) -> Option<PathBuf> {
        self._temp_dir.as_ref().map(|d| d.path().join(JOURNAL_FILE))
    }

    /// Closes the store and opens it again from its journal.
    ///
    /// In-memory stores start over empty.
    pub fn reopen(self) -> Self {
        let Self { store, _temp_dir } = self;
        drop(store);
        match _temp_dir {
            Some(temp_dir) => {
                let store = open_file_store(&temp_dir.path().join(JOURNAL_FILE));
                Self {
                    store: Arc::new(store),
                    _temp_dir: Some(temp_dir),
                }
            }
            None => Self::memory(),
        }
    }

    /// Returns a shared handle to the store.
    pub fn handle(&self) -> Arc<LocalStore> {
        Arc::clone(&self.store)
    }
}

impl std::ops::Deref for TestStore {
    type Target = LocalStore;

    fn deref(&self) -> &Self::Target {
        &self.store
    }
}

fn open_file_store(path: &std::path::Path) -> LocalStore {
    let backend = FileBackend::open_with_create_dirs(path).expect("Failed to open journal backend");
    LocalStore::open(StoreConfig::default(), Box::new(backend)).expect("Failed to open file store")
}

/// Runs a test with a temporary in-memory store.
///
/// # Example
///
/// ```rust
/// use pagesync_testkit::with_temp_store;
///
/// with_temp_store(|store| {
///     assert_eq!(store.record_count(), 0);
/// });
/// ```
pub fn with_temp_store<F, R>(f: F) -> R
where
    F: FnOnce(&LocalStore) -> R,
{
    let test_store = TestStore::memory();
    f(&test_store.store)
}

/// Builds the rows the mediator would write for `page` with `n` records.
///
/// Keys follow [`SyntheticFetcher`]'s `p{page}/e{i}` scheme. `last` marks
/// the page as the end of the data.
pub fn page_rows(page: u32, n: usize, last: bool) -> (Vec<Record>, Vec<RemoteKey>) {
    let records: Vec<_> = (1..=n)
        .map(|i| Record::new(format!("p{page}/e{i}"), format!("Item {i} of page {page}")))
        .collect();
    let prev = (page > 1).then(|| page - 1);
    let next = (!last).then(|| page + 1);
    let keys = records
        .iter()
        .map(|record| RemoteKey::new(record.key.clone(), prev, next))
        .collect();
    (records, keys)
}

/// Test scenario helpers.
pub mod scenarios {
    use super::*;

    /// Creates a store holding pages `1..=pages` of `page_size` records,
    /// each committed in its own transaction.
    pub fn seeded_store(pages: u32, page_size: usize) -> TestStore {
        let test_store = TestStore::memory();
        for page in 1..=pages {
            let (records, keys) = page_rows(page, page_size, false);
            test_store
                .transaction(|txn| {
                    txn.upsert_remote_keys(keys);
                    txn.upsert_records(records, page);
                    Ok(())
                })
                .expect("Failed to seed page");
        }
        test_store
    }

    /// A cache-backed session over a fresh store.
    ///
    /// The fetcher is shared so the test can inspect its call log.
    pub fn cached_session(
        fetcher: SyntheticFetcher,
        config: PagerConfig,
    ) -> (Pager<Arc<SyntheticFetcher>>, Arc<SyntheticFetcher>, TestStore) {
        let fetcher = Arc::new(fetcher);
        let test_store = TestStore::memory();
        let pager = Pager::with_mediator(Arc::clone(&fetcher), test_store.handle(), config)
            .expect("Failed to create pager");
        (pager, fetcher, test_store)
    }

    /// A cache-free session.
    pub fn source_session(
        fetcher: SyntheticFetcher,
        config: PagerConfig,
    ) -> (Pager<Arc<SyntheticFetcher>>, Arc<SyntheticFetcher>) {
        let fetcher = Arc::new(fetcher);
        let pager = Pager::new(Arc::clone(&fetcher), config).expect("Failed to create pager");
        (pager, fetcher)
    }
}
