//! Remote-to-cache synchronisation.
//!
//! The mediator turns a [`PageRequest`] into at most one remote fetch and
//! one store transaction. Which page to fetch is read from the cursor rows
//! of the cached records at the edge the request grows:
//!
//! | Load type | Cursor source             | Target page            |
//! |-----------|---------------------------|------------------------|
//! | Refresh   | record nearest the anchor | `next_page - 1`, or 1  |
//! | Append    | last loaded record        | `next_page`            |
//! | Prepend   | first loaded record       | `prev_page`            |
//!
//! A fetched page is committed as one unit: on refresh both tables are
//! cleared first, then one cursor row and one cache row per record are
//! written. Readers never see records without cursors or the reverse.

use crate::config::{InitializeAction, PagerConfig};
use crate::error::{PagingError, PagingResult};
use crate::fetcher::{fetch_with_timeout, RemoteFetcher};
use crate::model::{LoadType, MediatorResult, Page, PageRequest, PagingState, INITIAL_PAGE};
use pagesync_store::{CachedRecord, LocalStore, Record, RemoteKey};
use std::sync::Arc;
use tracing::{debug, warn};

/// Where a load resolved to before any fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Target {
    Fetch(u32),
    Done { end_of_pagination: bool },
}

/// Fetches remote pages into a [`LocalStore`] and keeps their cursors.
#[derive(Debug)]
pub struct SyncMediator<F> {
    fetcher: F,
    store: Arc<LocalStore>,
    config: PagerConfig,
    commit_gate: Arc<tokio::sync::Mutex<()>>,
}

impl<F: RemoteFetcher> SyncMediator<F> {
    /// Creates a mediator writing into `store`.
    pub fn new(fetcher: F, store: Arc<LocalStore>, config: PagerConfig) -> Self {
        Self {
            fetcher,
            store,
            config,
            commit_gate: Arc::new(tokio::sync::Mutex::new(())),
        }
    }

    /// Tells the pager whether to refresh before serving cached rows.
    pub fn initialize(&self) -> InitializeAction {
        self.config.initialize_action
    }

    /// Returns the store written by this mediator.
    pub fn store(&self) -> &Arc<LocalStore> {
        &self.store
    }

    /// Returns the remote fetcher.
    pub fn fetcher(&self) -> &F {
        &self.fetcher
    }

    /// Waits until no commit is in flight.
    ///
    /// A load dropped after handing its commit to the blocking pool returns
    /// before the cache changes; settling first makes that change visible.
    pub async fn settle(&self) {
        let _gate = self.commit_gate.lock().await;
    }

    /// Runs one load against the remote and commits the result.
    ///
    /// `pages` are the cache pages currently presented to the consumer.
    ///
    /// An append or prepend issued before any refresh has landed finds no
    /// cursor and succeeds without fetching, reporting that more data may
    /// exist.
    ///
    /// # Errors
    ///
    /// Returns [`PagingError::Fetch`] if the remote call fails or times out,
    /// and [`PagingError::Store`] if the commit fails. The cache is left as
    /// it was in both cases.
    pub async fn load(
        &self,
        request: PageRequest,
        pages: &[Page<usize, CachedRecord>],
    ) -> PagingResult<MediatorResult> {
        let state = PagingState::new(pages, request.anchor_position);
        let page = match self.resolve_target(request.load_type, state) {
            Target::Fetch(page) => page,
            Target::Done { end_of_pagination } => {
                debug!(
                    load_type = %request.load_type,
                    end_of_pagination,
                    "no remote page to fetch"
                );
                return Ok(MediatorResult::without_fetch(end_of_pagination));
            }
        };

        let fetched = fetch_with_timeout(
            &self.fetcher,
            page,
            self.config.page_size,
            self.config.fetch_timeout,
        )
        .await
        .inspect_err(|e| {
            warn!(load_type = %request.load_type, page, error = %e, "remote fetch failed")
        })?;

        let end_of_pagination = fetched.end_of_pagination;
        let records = fetched.records.len();
        self.commit(request.load_type, page, end_of_pagination, fetched.records)
            .await?;

        debug!(
            load_type = %request.load_type,
            page,
            records,
            end_of_pagination,
            "remote page committed"
        );
        Ok(MediatorResult {
            end_of_pagination,
            fetched_page: Some(page),
            records,
        })
    }

    fn resolve_target(
        &self,
        load_type: LoadType,
        state: PagingState<'_, usize, CachedRecord>,
    ) -> Target {
        match load_type {
            LoadType::Refresh => {
                let page = self
                    .remote_key_closest_to_anchor(state)
                    .and_then(|key| key.next_page)
                    .and_then(|next| next.checked_sub(1))
                    .filter(|page| *page >= INITIAL_PAGE)
                    .unwrap_or(INITIAL_PAGE);
                Target::Fetch(page)
            }
            LoadType::Append => {
                let key = state.last_item().and_then(|row| self.cursor(row));
                match key {
                    None => Target::Done {
                        end_of_pagination: false,
                    },
                    Some(RemoteKey {
                        next_page: Some(next),
                        ..
                    }) => Target::Fetch(next),
                    Some(_) => Target::Done {
                        end_of_pagination: true,
                    },
                }
            }
            LoadType::Prepend => {
                let key = state.first_item().and_then(|row| self.cursor(row));
                match key {
                    None => Target::Done {
                        end_of_pagination: false,
                    },
                    Some(RemoteKey {
                        prev_page: Some(prev),
                        ..
                    }) => Target::Fetch(prev),
                    Some(_) => Target::Done {
                        end_of_pagination: true,
                    },
                }
            }
        }
    }

    fn remote_key_closest_to_anchor(
        &self,
        state: PagingState<'_, usize, CachedRecord>,
    ) -> Option<RemoteKey> {
        let anchor = state.anchor_position?;
        let row = state.closest_item_to_position(anchor)?;
        self.cursor(row)
    }

    fn cursor(&self, row: &CachedRecord) -> Option<RemoteKey> {
        self.store.remote_key(row.key())
    }

    /// Commits a fetched page on the blocking pool.
    ///
    /// Once spawned, the transaction runs to completion even if this future
    /// is dropped. The gate is held until it finishes, so a later commit
    /// always lands after it.
    async fn commit(
        &self,
        load_type: LoadType,
        page: u32,
        end_of_pagination: bool,
        records: Vec<Record>,
    ) -> PagingResult<()> {
        let prev_page = (page != INITIAL_PAGE).then(|| page - 1);
        let next_page = (!end_of_pagination).then(|| page + 1);
        let store = Arc::clone(&self.store);
        let gate = Arc::clone(&self.commit_gate).lock_owned().await;

        tokio::task::spawn_blocking(move || {
            let _gate = gate;
            store.transaction(|txn| {
                if load_type == LoadType::Refresh {
                    txn.clear_remote_keys();
                    txn.clear_records();
                }
                let keys = records
                    .iter()
                    .map(|record| RemoteKey::new(record.key.clone(), prev_page, next_page))
                    .collect();
                txn.upsert_remote_keys(keys);
                txn.upsert_records(records, page);
                Ok(())
            })
        })
        .await
        .map_err(|e| PagingError::Task(e.to_string()))??;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetcher::{FaultSchedule, SyntheticFetcher};
    use std::time::Duration;

    type Mediator = SyncMediator<SyntheticFetcher>;

    fn mediator(fetcher: SyntheticFetcher) -> Mediator {
        let config = PagerConfig::new(3).with_fetch_timeout(Duration::from_secs(5));
        SyncMediator::new(fetcher, Arc::new(LocalStore::in_memory()), config)
    }

    /// Runs `request` with the whole cache presented as one page.
    async fn load(mediator: &Mediator, request: PageRequest) -> PagingResult<MediatorResult> {
        let pages = vec![Page::new(mediator.store().all_records(), None, None)];
        mediator.load(request, &pages).await
    }

    #[tokio::test]
    async fn refresh_without_anchor_loads_first_page() {
        let mediator = mediator(SyntheticFetcher::new());
        let result = load(&mediator, PageRequest::refresh(None)).await.unwrap();

        assert_eq!(result.fetched_page, Some(1));
        assert_eq!(result.records, 3);
        assert!(!result.end_of_pagination);

        let key = mediator.store().remote_key("p1/e2").unwrap();
        assert_eq!((key.prev_page, key.next_page), (None, Some(2)));
        assert_eq!(mediator.store().record("p1/e3").unwrap().page, 1);
    }

    #[tokio::test]
    async fn append_before_refresh_does_not_fetch() {
        let mediator = mediator(SyntheticFetcher::new());

        let result = mediator.load(PageRequest::append(), &[]).await.unwrap();
        assert_eq!(result, MediatorResult::without_fetch(false));
        let result = load(&mediator, PageRequest::prepend()).await.unwrap();
        assert_eq!(result, MediatorResult::without_fetch(false));
        assert_eq!(mediator.fetcher().call_count(), 0);
        assert_eq!(mediator.store().version(), 0);
    }

    #[tokio::test]
    async fn short_page_keeps_forward_cursor() {
        let fetcher = SyntheticFetcher::new().with_short_page(3, 1);
        let mediator = mediator(fetcher.with_last_page(3));
        load(&mediator, PageRequest::refresh(None)).await.unwrap();
        load(&mediator, PageRequest::append()).await.unwrap();

        let result = load(&mediator, PageRequest::append()).await.unwrap();
        assert_eq!(result.fetched_page, Some(3));
        assert_eq!(result.records, 1);
        assert!(!result.end_of_pagination);
        let key = mediator.store().remote_key("p3/e1").unwrap();
        assert_eq!((key.prev_page, key.next_page), (Some(2), Some(4)));

        let result = load(&mediator, PageRequest::append()).await.unwrap();
        assert_eq!(result.fetched_page, Some(4));
        assert_eq!(result.records, 0);
        assert!(result.end_of_pagination);
        assert_eq!(mediator.store().record_count(), 7);
        assert_eq!(mediator.fetcher().requested_pages(), [1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn append_follows_last_cursor() {
        let mediator = mediator(SyntheticFetcher::new());
        load(&mediator, PageRequest::refresh(None)).await.unwrap();

        let result = load(&mediator, PageRequest::append()).await.unwrap();
        assert_eq!(result.fetched_page, Some(2));

        let key = mediator.store().remote_key("p2/e1").unwrap();
        assert_eq!((key.prev_page, key.next_page), (Some(1), Some(3)));
        assert_eq!(mediator.store().record_count(), 6);
    }

    #[tokio::test]
    async fn prepend_at_first_page_is_end_of_pagination() {
        let mediator = mediator(SyntheticFetcher::new());
        load(&mediator, PageRequest::refresh(None)).await.unwrap();

        let result = load(&mediator, PageRequest::prepend()).await.unwrap();
        assert_eq!(result, MediatorResult::without_fetch(true));
        assert_eq!(mediator.fetcher().call_count(), 1);
    }

    #[tokio::test]
    async fn refresh_resumes_at_anchor_page_and_clears_cache() {
        let mediator = mediator(SyntheticFetcher::new());
        load(&mediator, PageRequest::refresh(None)).await.unwrap();
        for _ in 0..2 {
            load(&mediator, PageRequest::append()).await.unwrap();
        }

        // Position 7 is the second record of page 3.
        let request = PageRequest::refresh(Some(7));
        let result = load(&mediator, request).await.unwrap();
        assert_eq!(result.fetched_page, Some(3));

        let rows = mediator.store().all_records();
        assert_eq!(rows.len(), 3);
        assert!(rows.iter().all(|row| row.page == 3));
        assert_eq!(mediator.store().remote_key_count(), 3);
        assert!(mediator.store().remote_key("p1/e1").is_none());

        let result = load(&mediator, PageRequest::prepend()).await.unwrap();
        assert_eq!(result.fetched_page, Some(2));
    }

    #[tokio::test]
    async fn empty_page_ends_pagination() {
        let mediator = mediator(SyntheticFetcher::new().with_last_page(1));
        load(&mediator, PageRequest::refresh(None)).await.unwrap();

        let result = load(&mediator, PageRequest::append()).await.unwrap();
        assert!(result.end_of_pagination);
        assert_eq!(result.records, 0);

        // The last cursor still points at page 2, so the next append refetches it.
        let result = load(&mediator, PageRequest::append()).await.unwrap();
        assert_eq!(result.fetched_page, Some(2));
    }

    #[tokio::test]
    async fn failed_fetch_leaves_cache_untouched() {
        let faults = Arc::new(FaultSchedule::new().fail_once_on_page(2));
        let mediator = mediator(SyntheticFetcher::new().with_faults(faults));
        load(&mediator, PageRequest::refresh(None)).await.unwrap();
        let before = mediator.store().all_records();

        let err = load(&mediator, PageRequest::append()).await.unwrap_err();
        assert!(matches!(err, PagingError::Fetch(_)));
        assert!(err.is_retryable());
        assert_eq!(mediator.store().all_records(), before);
        assert_eq!(mediator.store().version(), 1);

        let result = load(&mediator, PageRequest::append()).await.unwrap();
        assert_eq!(result.fetched_page, Some(2));
    }

    #[tokio::test]
    async fn failed_refresh_keeps_previous_cache() {
        let faults = Arc::new(FaultSchedule::new().fail_on_call(2));
        let mediator = mediator(SyntheticFetcher::new().with_faults(faults));
        load(&mediator, PageRequest::refresh(None)).await.unwrap();

        let request = PageRequest::refresh(Some(0));
        assert!(load(&mediator, request).await.is_err());
        assert_eq!(mediator.store().record_count(), 3);
        assert_eq!(mediator.store().remote_key_count(), 3);
    }

    #[test]
    fn initialize_reports_configured_action() {
        let config =
            PagerConfig::new(3).with_initialize_action(InitializeAction::SkipInitialRefresh);
        let store = Arc::new(LocalStore::in_memory());
        let mediator = SyncMediator::new(SyntheticFetcher::new(), store, config);
        assert_eq!(mediator.initialize(), InitializeAction::SkipInitialRefresh);
    }
}
