//! The paging session facade.
//!
//! A [`Pager`] presents one continuous, growable sequence of records built
//! either straight from the remote through a [`PagingSource`], or from the
//! local cache through a [`CacheReader`] kept filled by a [`SyncMediator`].
//!
//! ## Pipeline
//!
//! Loads of one session run one at a time behind an async lock. A call to
//! [`Pager::refresh`] bumps the session generation first; a load that is
//! still waiting on the lock or on the remote when that happens gives up
//! with [`PagingError::Superseded`]. Cache commits are never abandoned
//! half way; see [`SyncMediator`].
//!
//! ## Laziness
//!
//! Nothing is fetched until the consumer asks. The first `load_more`,
//! `access` or `refresh` performs the initial load.

use crate::cache_reader::CacheReader;
use crate::config::{InitializeAction, PagerConfig};
use crate::error::{PagingError, PagingResult};
use crate::fetcher::RemoteFetcher;
use crate::load_state::{LoadState, LoadStates, PagingSnapshot};
use crate::mediator::SyncMediator;
use crate::model::{Direction, LoadType, Page, PageRequest, PagingState};
use crate::paging_source::PagingSource;
use pagesync_store::{CachedRecord, LocalStore, Record};
use parking_lot::{Mutex, RwLock};
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::watch;
use tokio_stream::wrappers::WatchStream;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Counters for one paging session.
#[derive(Debug, Clone, Default)]
pub struct PagerStats {
    /// Remote fetches attempted.
    pub fetches: u64,
    /// Records returned by successful fetches.
    pub records_fetched: u64,
    /// Fetches or commits that failed.
    pub failures: u64,
    /// Refreshes that completed.
    pub refreshes: u64,
    /// Retries issued through [`Pager::retry`].
    pub retries: u64,
    /// Time of the last successful load.
    pub last_load_time: Option<Instant>,
    /// Last error message.
    pub last_error: Option<String>,
}

enum Backend<F> {
    Source(PagingSource<F>),
    Mediated {
        mediator: SyncMediator<F>,
        reader: CacheReader,
    },
}

#[derive(Debug, Default)]
struct Session {
    started: bool,
    /// Number of times the presented sequence was rebuilt.
    generation: u64,
    source_pages: Vec<Page<u32, Record>>,
    /// Number of leading cache rows currently presented.
    presented: usize,
    cache_pages: Vec<Page<usize, CachedRecord>>,
    load_states: LoadStates,
}

impl Session {
    fn items(&self) -> Arc<[Record]> {
        if self.cache_pages.is_empty() {
            self.source_pages
                .iter()
                .flat_map(|page| page.data.iter().cloned())
                .collect()
        } else {
            self.cache_pages
                .iter()
                .flat_map(|page| page.data.iter().map(|row| row.record.clone()))
                .collect()
        }
    }

    /// Re-reads the first `len` cache rows in `chunk` sized pages.
    fn read_window(&mut self, reader: &CacheReader, len: usize, chunk: usize) {
        let chunk = chunk.max(1);
        let mut pages = Vec::new();
        let mut offset = 0;
        while offset < len {
            let page = reader.load(offset, chunk.min(len - offset));
            if page.is_empty() {
                break;
            }
            offset += page.len();
            pages.push(page);
        }
        self.presented = offset;
        self.cache_pages = pages;
    }
}

/// Entry point of a paging session.
///
/// # Example
///
/// ```no_run
/// use pagesync_engine::{Direction, Pager, PagerConfig, SyntheticFetcher};
///
/// # async fn run() -> pagesync_engine::PagingResult<()> {
/// let pager = Pager::new(SyntheticFetcher::new(), PagerConfig::new(20))?;
/// pager.refresh().await?;
/// pager.load_more(Direction::Append).await?;
/// assert_eq!(pager.snapshot().len(), 40);
/// # Ok(())
/// # }
/// ```
pub struct Pager<F> {
    config: PagerConfig,
    backend: Backend<F>,
    session_id: Uuid,
    session: tokio::sync::Mutex<Session>,
    generation: watch::Sender<u64>,
    snapshots: watch::Sender<PagingSnapshot>,
    anchor: Mutex<Option<usize>>,
    stats: RwLock<PagerStats>,
}

impl<F: RemoteFetcher> Pager<F> {
    /// Creates a cache-free session that pages straight from `fetcher`.
    ///
    /// # Errors
    ///
    /// Returns [`PagingError::InvalidConfig`] if `config` fails validation.
    pub fn new(fetcher: F, config: PagerConfig) -> PagingResult<Self> {
        config.validate()?;
        let source = PagingSource::new(fetcher, config.fetch_timeout);
        Ok(Self::with_backend(config, Backend::Source(source)))
    }

    /// Creates a cache-backed session over `store`.
    ///
    /// # Errors
    ///
    /// Returns [`PagingError::InvalidConfig`] if `config` fails validation.
    pub fn with_mediator(
        fetcher: F,
        store: Arc<LocalStore>,
        config: PagerConfig,
    ) -> PagingResult<Self> {
        config.validate()?;
        let reader = CacheReader::new(Arc::clone(&store));
        let mediator = SyncMediator::new(fetcher, store, config.clone());
        Ok(Self::with_backend(config, Backend::Mediated { mediator, reader }))
    }

    fn with_backend(config: PagerConfig, backend: Backend<F>) -> Self {
        let (generation, _) = watch::channel(0);
        let (snapshots, _) = watch::channel(PagingSnapshot::empty());
        let session_id = Uuid::new_v4();
        debug!(session = %session_id, page_size = config.page_size, "paging session created");
        Self {
            config,
            backend,
            session_id,
            session: tokio::sync::Mutex::new(Session::default()),
            generation,
            snapshots,
            anchor: Mutex::new(None),
            stats: RwLock::new(PagerStats::default()),
        }
    }

    /// Returns the session id recorded in this session's log lines.
    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    /// Returns the session configuration.
    pub fn config(&self) -> &PagerConfig {
        &self.config
    }

    /// Returns the local store of a cache-backed session.
    pub fn store(&self) -> Option<&Arc<LocalStore>> {
        match &self.backend {
            Backend::Source(_) => None,
            Backend::Mediated { mediator, .. } => Some(mediator.store()),
        }
    }

    /// Returns the remote fetcher.
    pub fn fetcher(&self) -> &F {
        match &self.backend {
            Backend::Source(source) => source.fetcher(),
            Backend::Mediated { mediator, .. } => mediator.fetcher(),
        }
    }

    /// Returns the latest snapshot.
    pub fn snapshot(&self) -> PagingSnapshot {
        self.snapshots.borrow().clone()
    }

    /// Returns a receiver that observes every published snapshot.
    pub fn subscribe(&self) -> watch::Receiver<PagingSnapshot> {
        self.snapshots.subscribe()
    }

    /// Returns the snapshots as a stream, starting with the current one.
    ///
    /// Intermediate snapshots may be skipped by a slow consumer; the latest
    /// one is always delivered.
    pub fn snapshots(&self) -> WatchStream<PagingSnapshot> {
        WatchStream::new(self.subscribe())
    }

    /// Returns the session counters.
    pub fn stats(&self) -> PagerStats {
        self.stats.read().clone()
    }

    /// Records the consumer's viewing position.
    pub fn set_anchor(&self, position: usize) {
        *self.anchor.lock() = Some(position);
    }

    /// Returns the consumer's last viewing position.
    pub fn anchor(&self) -> Option<usize> {
        *self.anchor.lock()
    }

    /// Discards the presented sequence and rebuilds it from a refresh.
    ///
    /// Any load still pending when this is called is superseded.
    ///
    /// # Errors
    ///
    /// Returns the refresh failure, or [`PagingError::Superseded`] if a
    /// newer refresh was requested while this one waited.
    pub async fn refresh(&self) -> PagingResult<()> {
        let mut generation = 0;
        self.generation.send_modify(|current| {
            *current += 1;
            generation = *current;
        });
        info!(session = %self.session_id, generation, "refresh requested");

        let mut session = self.session.lock().await;
        self.ensure_current(generation)?;
        self.run_refresh(&mut session, generation, false).await
    }

    /// Loads more data in `direction`.
    ///
    /// The first call on a fresh session performs the initial load instead.
    /// A direction that reached the end of pagination is left alone until
    /// the next refresh.
    ///
    /// # Errors
    ///
    /// Returns the load failure, or [`PagingError::Superseded`] if a refresh
    /// replaced the session meanwhile.
    pub async fn load_more(&self, direction: Direction) -> PagingResult<()> {
        let generation = *self.generation.borrow();
        let mut session = self.session.lock().await;
        self.ensure_current(generation)?;

        if !session.started {
            return self.run_refresh(&mut session, generation, true).await;
        }
        let load_type = direction.load_type();
        self.run_load(&mut session, generation, load_type).await
    }

    /// Re-issues every load whose last attempt failed, refresh first.
    ///
    /// Data loaded in other directions is kept.
    ///
    /// # Errors
    ///
    /// Returns the first failure.
    pub async fn retry(&self) -> PagingResult<()> {
        let failed = self.snapshot().load_states.failed();
        if failed.is_empty() {
            return Ok(());
        }
        self.stats.write().retries += 1;
        debug!(session = %self.session_id, ?failed, "retrying failed loads");

        if failed.contains(&LoadType::Refresh) {
            return self.refresh().await;
        }
        for load_type in failed {
            let direction = match load_type {
                LoadType::Prepend => Direction::Prepend,
                LoadType::Append => Direction::Append,
                LoadType::Refresh => continue,
            };
            self.load_more(direction).await?;
        }
        Ok(())
    }

    /// Calls [`Pager::retry`] until it succeeds, waiting between attempts as
    /// the configured [`crate::RetryConfig`] prescribes.
    ///
    /// # Errors
    ///
    /// Returns the last failure once attempts run out, or immediately for a
    /// failure that is not retryable.
    pub async fn retry_with_backoff(&self) -> PagingResult<()> {
        let policy = self.config.retry.clone();
        let mut attempt = 0;
        loop {
            tokio::time::sleep(policy.delay_for_attempt(attempt)).await;
            match self.retry().await {
                Ok(()) => return Ok(()),
                Err(e) if e.is_retryable() && attempt + 1 < policy.max_attempts => {
                    warn!(session = %self.session_id, attempt, error = %e, "retry failed");
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Reads the item at `position`, recording it as the anchor.
    ///
    /// A fresh session performs its initial load first. The item is read
    /// before any prefetch, so the returned record is the one that sat at
    /// `position` when the consumer looked. Loads more data afterwards when
    /// `position` is within the prefetch distance of either edge.
    ///
    /// # Errors
    ///
    /// Returns the failure of a triggered load.
    pub async fn access(&self, position: usize) -> PagingResult<Option<Record>> {
        self.set_anchor(position);

        let mut snapshot = self.snapshot();
        if snapshot.generation == 0 && snapshot.load_states.refresh == LoadState::NOT_LOADING {
            self.load_more(Direction::Append).await?;
            snapshot = self.snapshot();
        }
        let item = snapshot.get(position).cloned();
        if snapshot.is_empty() {
            return Ok(item);
        }

        let distance = self.config.prefetch_distance as usize;
        let states = &snapshot.load_states;
        let near_end = position.saturating_add(distance) >= snapshot.len();
        if near_end && states.append == LoadState::NOT_LOADING {
            self.load_more(Direction::Append).await?;
        }
        if position < distance && states.prepend == LoadState::NOT_LOADING {
            self.load_more(Direction::Prepend).await?;
        }
        Ok(item)
    }

    fn ensure_current(&self, generation: u64) -> PagingResult<()> {
        if *self.generation.borrow() == generation {
            Ok(())
        } else {
            debug!(session = %self.session_id, generation, "load superseded before start");
            Err(PagingError::Superseded)
        }
    }

    /// Runs `fut` unless a refresh supersedes `generation` first.
    async fn unless_superseded<T>(
        &self,
        generation: u64,
        fut: impl Future<Output = PagingResult<T>>,
    ) -> PagingResult<T> {
        let mut changed = self.generation.subscribe();
        tokio::select! {
            biased;
            result = fut => result,
            _ = changed.wait_for(|current| *current != generation) => {
                debug!(session = %self.session_id, generation, "load superseded in flight");
                Err(PagingError::Superseded)
            }
        }
    }

    async fn run_refresh(
        &self,
        session: &mut Session,
        generation: u64,
        initial: bool,
    ) -> PagingResult<()> {
        session.load_states.refresh = LoadState::Loading;
        self.publish(session);

        let result = match &self.backend {
            Backend::Source(source) => self.refresh_source(session, source, generation).await,
            Backend::Mediated { mediator, reader } => {
                let skip = initial
                    && mediator.initialize() == InitializeAction::SkipInitialRefresh
                    && reader.row_count() > 0;
                if skip {
                    self.serve_cached(session, reader);
                    Ok(())
                } else {
                    self.refresh_mediated(session, mediator, reader, generation)
                        .await
                }
            }
        };

        match result {
            Ok(()) => {
                session.started = true;
                session.generation += 1;
                session.load_states.refresh = LoadState::NOT_LOADING;
                let mut stats = self.stats.write();
                stats.refreshes += 1;
                stats.last_load_time = Some(Instant::now());
                drop(stats);
                info!(
                    session = %self.session_id,
                    generation,
                    items = session.cache_pages.iter().map(Page::len).sum::<usize>()
                        + session.source_pages.iter().map(Page::len).sum::<usize>(),
                    "refresh completed"
                );
            }
            Err(PagingError::Superseded) => {
                session.load_states.refresh = LoadState::NOT_LOADING;
                self.resync_after_superseded(session).await;
            }
            Err(ref e) => {
                session.load_states.refresh = LoadState::error(e.to_string());
                self.record_failure(e);
            }
        }
        self.publish(session);
        result
    }

    async fn refresh_source(
        &self,
        session: &mut Session,
        source: &PagingSource<F>,
        generation: u64,
    ) -> PagingResult<()> {
        let anchor = self.anchor();
        let key = PagingSource::<F>::refresh_key(PagingState::new(&session.source_pages, anchor));
        let page = self
            .unless_superseded(generation, async {
                source
                    .load(key, self.config.page_size)
                    .await
                    .map_err(PagingError::from)
            })
            .await
            .inspect_err(|e| self.count_fetch_error(e))?;
        self.count_fetch(page.len());

        session.load_states.prepend = LoadState::idle(page.prev_key.is_none());
        session.load_states.append = LoadState::idle(page.next_key.is_none());
        session.cache_pages.clear();
        session.source_pages = vec![page];
        Ok(())
    }

    async fn refresh_mediated(
        &self,
        session: &mut Session,
        mediator: &SyncMediator<F>,
        reader: &CacheReader,
        generation: u64,
    ) -> PagingResult<()> {
        let request = PageRequest::refresh(self.anchor());
        let result = self
            .unless_superseded(generation, mediator.load(request, &session.cache_pages))
            .await
            .inspect_err(|e| self.count_fetch_error(e))?;
        self.count_fetch(result.records);

        let initial = self.config.initial_load_size as usize;
        session.read_window(reader, initial, self.config.page_size as usize);
        session.source_pages.clear();
        session.load_states.prepend = LoadState::NOT_LOADING;
        session.load_states.append = LoadState::idle(result.end_of_pagination);
        Ok(())
    }

    /// Lets a commit the superseded load already started land, then
    /// re-reads the presented rows so later cursor lookups see the cache as
    /// it now is.
    async fn resync_after_superseded(&self, session: &mut Session) {
        if let Backend::Mediated { mediator, reader } = &self.backend {
            mediator.settle().await;
            let presented = session.presented;
            session.read_window(reader, presented, self.config.page_size as usize);
        }
    }

    fn serve_cached(&self, session: &mut Session, reader: &CacheReader) {
        let initial = self.config.initial_load_size as usize;
        session.read_window(reader, initial, self.config.page_size as usize);
        session.load_states.prepend = LoadState::NOT_LOADING;
        session.load_states.append = LoadState::NOT_LOADING;
        debug!(session = %self.session_id, rows = session.presented, "serving cached rows");
    }

    async fn run_load(
        &self,
        session: &mut Session,
        generation: u64,
        load_type: LoadType,
    ) -> PagingResult<()> {
        let state = session.load_states.get(load_type);
        if state.end_of_pagination() {
            debug!(session = %self.session_id, %load_type, "end of pagination reached");
            return Ok(());
        }

        session.load_states.set(load_type, LoadState::Loading);
        self.publish(session);

        let result = match &self.backend {
            Backend::Source(source) => {
                self.load_source(session, source, generation, load_type)
                    .await
            }
            Backend::Mediated { mediator, reader } => {
                self.load_mediated(session, mediator, reader, generation, load_type)
                    .await
            }
        };

        match &result {
            Ok(end_of_pagination) => {
                let state = LoadState::idle(*end_of_pagination);
                session.load_states.set(load_type, state);
                self.stats.write().last_load_time = Some(Instant::now());
            }
            Err(PagingError::Superseded) => {
                session.load_states.set(load_type, LoadState::NOT_LOADING);
                self.resync_after_superseded(session).await;
            }
            Err(e) => {
                let state = LoadState::error(e.to_string());
                session.load_states.set(load_type, state);
                self.record_failure(e);
            }
        }
        self.publish(session);
        result.map(|_| ())
    }

    /// Returns whether the direction is exhausted.
    async fn load_source(
        &self,
        session: &mut Session,
        source: &PagingSource<F>,
        generation: u64,
        load_type: LoadType,
    ) -> PagingResult<bool> {
        let key = match load_type {
            LoadType::Append => session.source_pages.last().and_then(|page| page.next_key),
            LoadType::Prepend => session.source_pages.first().and_then(|page| page.prev_key),
            LoadType::Refresh => None,
        };
        let Some(key) = key else {
            return Ok(true);
        };

        let page = self
            .unless_superseded(generation, async {
                source
                    .load(Some(key), self.config.page_size)
                    .await
                    .map_err(PagingError::from)
            })
            .await
            .inspect_err(|e| self.count_fetch_error(e))?;
        self.count_fetch(page.len());

        if load_type == LoadType::Prepend {
            let end = page.prev_key.is_none();
            session.source_pages.insert(0, page);
            Ok(end)
        } else {
            let end = page.next_key.is_none();
            session.source_pages.push(page);
            Ok(end)
        }
    }

    /// Returns whether the direction is exhausted.
    async fn load_mediated(
        &self,
        session: &mut Session,
        mediator: &SyncMediator<F>,
        reader: &CacheReader,
        generation: u64,
        load_type: LoadType,
    ) -> PagingResult<bool> {
        let chunk = self.config.page_size as usize;
        let presented = session.presented;

        // Rows already cached past the window are served without a fetch.
        // The window always starts at the first cached row, so a prepend
        // has nothing buffered to serve.
        if load_type == LoadType::Append && presented < reader.row_count() {
            session.read_window(reader, presented + chunk, chunk);
            return Ok(false);
        }

        let request = PageRequest::new(load_type, self.anchor());
        let result = self
            .unless_superseded(generation, mediator.load(request, &session.cache_pages))
            .await
            .inspect_err(|e| self.count_fetch_error(e))?;
        if result.fetched_page.is_some() {
            self.count_fetch(result.records);
        }

        // A prepended page sorts in front of the window, growing it from the
        // start.
        session.read_window(reader, presented + result.records, chunk);
        Ok(result.end_of_pagination)
    }

    fn count_fetch(&self, records: usize) {
        let mut stats = self.stats.write();
        stats.fetches += 1;
        stats.records_fetched += records as u64;
    }

    fn count_fetch_error(&self, error: &PagingError) {
        if matches!(error, PagingError::Fetch(_)) {
            self.stats.write().fetches += 1;
        }
    }

    fn record_failure(&self, error: &PagingError) {
        warn!(session = %self.session_id, error = %error, "load failed");
        let mut stats = self.stats.write();
        stats.failures += 1;
        stats.last_error = Some(error.to_string());
    }

    fn publish(&self, session: &Session) {
        let snapshot = PagingSnapshot {
            generation: session.generation,
            items: session.items(),
            load_states: session.load_states.clone(),
        };
        self.snapshots.send_replace(snapshot);
    }
}

impl<F> std::fmt::Debug for Pager<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let backend = match &self.backend {
            Backend::Source(_) => "source",
            Backend::Mediated { .. } => "mediated",
        };
        f.debug_struct("Pager")
            .field("session_id", &self.session_id)
            .field("backend", &backend)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RetryConfig;
    use crate::fetcher::{FaultSchedule, SyntheticFetcher};
    use pagesync_storage::{InMemoryBackend, StorageBackend, StorageResult};
    use pagesync_store::StoreConfig;
    use parking_lot::Condvar;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;
    use tokio_stream::StreamExt;

    /// Holds journal appends until released.
    #[derive(Default)]
    struct AppendGate {
        held: Mutex<bool>,
        released: Condvar,
        entered: AtomicBool,
    }

    impl AppendGate {
        fn hold(&self) {
            *self.held.lock() = true;
        }

        fn release(&self) {
            *self.held.lock() = false;
            self.released.notify_all();
        }
    }

    struct GatedJournal {
        inner: InMemoryBackend,
        gate: Arc<AppendGate>,
    }

    impl StorageBackend for GatedJournal {
        fn read_at(&self, offset: u64, len: usize) -> StorageResult<Vec<u8>> {
            self.inner.read_at(offset, len)
        }

        fn append(&mut self, data: &[u8]) -> StorageResult<u64> {
            let mut held = self.gate.held.lock();
            if *held {
                self.gate.entered.store(true, Ordering::SeqCst);
            }
            while *held {
                self.gate.released.wait(&mut held);
            }
            drop(held);
            self.inner.append(data)
        }

        fn flush(&mut self) -> StorageResult<()> {
            self.inner.flush()
        }

        fn size(&self) -> StorageResult<u64> {
            self.inner.size()
        }

        fn sync(&mut self) -> StorageResult<()> {
            self.inner.sync()
        }

        fn truncate(&mut self, new_size: u64) -> StorageResult<()> {
            self.inner.truncate(new_size)
        }
    }

    fn source_pager(fetcher: SyntheticFetcher) -> Pager<SyntheticFetcher> {
        Pager::new(fetcher, PagerConfig::new(3)).unwrap()
    }

    fn cached_pager(fetcher: SyntheticFetcher, config: PagerConfig) -> Pager<SyntheticFetcher> {
        Pager::with_mediator(fetcher, Arc::new(LocalStore::in_memory()), config).unwrap()
    }

    fn keys(pager: &Pager<SyntheticFetcher>) -> Vec<String> {
        pager.snapshot().keys().map(str::to_owned).collect()
    }

    #[test]
    fn invalid_config_is_rejected() {
        let result = Pager::new(SyntheticFetcher::new(), PagerConfig::new(0));
        assert!(matches!(result, Err(PagingError::InvalidConfig(_))));
    }

    #[tokio::test]
    async fn nothing_is_fetched_until_asked() {
        let pager = source_pager(SyntheticFetcher::new());
        assert!(pager.snapshot().is_empty());
        assert_eq!(pager.snapshot().generation, 0);
        assert_eq!(pager.fetcher().call_count(), 0);

        pager.load_more(Direction::Append).await.unwrap();
        assert_eq!(keys(&pager), ["p1/e1", "p1/e2", "p1/e3"]);
        assert_eq!(pager.snapshot().generation, 1);
    }

    #[tokio::test]
    async fn source_session_grows_and_detects_end() {
        let pager = source_pager(SyntheticFetcher::new().with_short_page(2, 1));
        pager.refresh().await.unwrap();
        assert!(pager.snapshot().load_states.prepend.end_of_pagination());

        pager.load_more(Direction::Append).await.unwrap();
        let snapshot = pager.snapshot();
        assert_eq!(snapshot.len(), 4);
        assert!(snapshot.load_states.append.end_of_pagination());

        pager.load_more(Direction::Append).await.unwrap();
        assert_eq!(pager.fetcher().requested_pages(), [1, 2]);
    }

    #[tokio::test]
    async fn cached_session_reads_through_store() {
        let fetcher = SyntheticFetcher::new().with_last_page(2);
        let pager = cached_pager(fetcher, PagerConfig::new(3));
        pager.refresh().await.unwrap();
        pager.load_more(Direction::Append).await.unwrap();
        pager.load_more(Direction::Append).await.unwrap();

        let snapshot = pager.snapshot();
        assert_eq!(snapshot.len(), 6);
        assert!(snapshot.load_states.append.end_of_pagination());
        assert_eq!(pager.store().unwrap().record_count(), 6);

        pager.load_more(Direction::Prepend).await.unwrap();
        assert!(pager.snapshot().load_states.prepend.end_of_pagination());
        assert_eq!(pager.fetcher().requested_pages(), [1, 2, 3]);
    }

    #[tokio::test]
    async fn failed_append_keeps_data_and_retries() {
        let faults = Arc::new(FaultSchedule::new().fail_once_on_page(2));
        let pager = source_pager(SyntheticFetcher::new().with_faults(faults));
        pager.refresh().await.unwrap();

        let err = pager.load_more(Direction::Append).await.unwrap_err();
        assert!(err.is_retryable());
        let snapshot = pager.snapshot();
        assert_eq!(snapshot.len(), 3);
        assert_eq!(
            snapshot.load_states.append.error_message(),
            Some("transient fetch error: Bad internet connection")
        );

        pager.retry().await.unwrap();
        let snapshot = pager.snapshot();
        assert_eq!(snapshot.len(), 6);
        assert_eq!(snapshot.load_states.append, LoadState::NOT_LOADING);

        let stats = pager.stats();
        assert_eq!(stats.fetches, 3);
        assert_eq!(stats.failures, 1);
        assert_eq!(stats.retries, 1);
        assert_eq!(stats.records_fetched, 6);
    }

    #[tokio::test]
    async fn retry_without_failure_is_a_no_op() {
        let pager = source_pager(SyntheticFetcher::new());
        pager.refresh().await.unwrap();
        pager.retry().await.unwrap();
        assert_eq!(pager.stats().retries, 0);
        assert_eq!(pager.fetcher().call_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn retry_with_backoff_outlasts_failures() {
        let faults = Arc::new(FaultSchedule::new().fail_on_call(2).fail_on_call(3));
        let retry = RetryConfig::new(3)
            .with_initial_delay(Duration::from_millis(100))
            .with_jitter(false);
        let config = PagerConfig::new(3).with_retry(retry);
        let pager = Pager::new(SyntheticFetcher::new().with_faults(faults), config).unwrap();
        pager.refresh().await.unwrap();

        assert!(pager.load_more(Direction::Append).await.is_err());
        pager.retry_with_backoff().await.unwrap();
        assert_eq!(pager.snapshot().len(), 6);
        assert_eq!(pager.stats().retries, 2);
    }

    #[tokio::test]
    async fn access_prefetches_near_the_end() {
        let config = PagerConfig::new(3).with_prefetch_distance(1);
        let pager = Pager::new(SyntheticFetcher::new(), config).unwrap();

        let item = pager.access(0).await.unwrap();
        assert_eq!(item.unwrap().key, "p1/e1");
        assert_eq!(pager.snapshot().len(), 3);

        let item = pager.access(2).await.unwrap();
        assert_eq!(item.unwrap().key, "p1/e3");
        assert_eq!(pager.snapshot().len(), 6);
        assert_eq!(pager.anchor(), Some(2));
    }

    #[tokio::test]
    async fn refresh_resumes_near_anchor() {
        let pager = source_pager(SyntheticFetcher::new());
        pager.refresh().await.unwrap();
        pager.load_more(Direction::Append).await.unwrap();
        pager.load_more(Direction::Append).await.unwrap();

        pager.set_anchor(4);
        pager.refresh().await.unwrap();
        assert_eq!(keys(&pager), ["p2/e1", "p2/e2", "p2/e3"]);
        assert_eq!(pager.snapshot().generation, 2);
        assert_eq!(pager.snapshot().load_states.prepend, LoadState::NOT_LOADING);
    }

    #[tokio::test]
    async fn skip_initial_refresh_serves_cache() {
        let store = Arc::new(LocalStore::in_memory());
        let config = PagerConfig::new(3);
        let seed = Pager::with_mediator(SyntheticFetcher::new(), Arc::clone(&store), config);
        seed.unwrap().refresh().await.unwrap();

        let config =
            PagerConfig::new(3).with_initialize_action(InitializeAction::SkipInitialRefresh);
        let pager = Pager::with_mediator(SyntheticFetcher::new(), store, config).unwrap();
        pager.load_more(Direction::Append).await.unwrap();

        assert_eq!(pager.snapshot().len(), 3);
        assert_eq!(pager.fetcher().call_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn fetch_timeout_surfaces_as_refresh_error() {
        let config = PagerConfig::new(3).with_fetch_timeout(Duration::from_secs(1));
        let fetcher = SyntheticFetcher::new().with_latency(Duration::from_secs(60));
        let pager = Pager::new(fetcher, config).unwrap();

        match pager.refresh().await {
            Err(PagingError::Fetch(e)) => assert!(e.is_timeout()),
            other => panic!("expected timeout, got {other:?}"),
        }
        assert!(pager.snapshot().load_states.refresh.is_error());
    }

    #[tokio::test(start_paused = true)]
    async fn refresh_supersedes_pending_append() {
        let fetcher = SyntheticFetcher::new().with_latency(Duration::from_secs(10));
        let pager = Arc::new(Pager::new(fetcher, PagerConfig::new(3)).unwrap());
        pager.refresh().await.unwrap();

        let pending = tokio::spawn({
            let pager = Arc::clone(&pager);
            async move { pager.load_more(Direction::Append).await }
        });
        tokio::task::yield_now().await;

        pager.refresh().await.unwrap();
        assert!(matches!(pending.await.unwrap(), Err(PagingError::Superseded)));

        let snapshot = pager.snapshot();
        assert_eq!(snapshot.len(), 3);
        assert_eq!(snapshot.generation, 2);
        assert_eq!(snapshot.load_states.append, LoadState::NOT_LOADING);
    }

    #[tokio::test]
    async fn snapshot_stream_sees_rebuilds() {
        let pager = source_pager(SyntheticFetcher::new());
        let mut stream = pager.snapshots();
        assert_eq!(stream.next().await.unwrap().generation, 0);

        pager.refresh().await.unwrap();
        let latest = stream.next().await.unwrap();
        assert_eq!(latest.generation, 1);
        assert_eq!(latest.len(), 3);
    }

    #[tokio::test]
    async fn superseded_refresh_rereads_committed_rows() {
        let gate = Arc::new(AppendGate::default());
        let journal = GatedJournal {
            inner: InMemoryBackend::new(),
            gate: Arc::clone(&gate),
        };
        let store = Arc::new(LocalStore::open(StoreConfig::default(), Box::new(journal)).unwrap());
        let pager = Pager::with_mediator(SyntheticFetcher::new(), store, PagerConfig::new(2));
        let pager = Arc::new(pager.unwrap());
        pager.refresh().await.unwrap();
        pager.load_more(Direction::Append).await.unwrap();
        pager.load_more(Direction::Append).await.unwrap();
        assert_eq!(pager.snapshot().len(), 6);

        // The first refresh reloads page 3 and stalls inside its commit.
        gate.hold();
        pager.set_anchor(5);
        let first = tokio::spawn({
            let pager = Arc::clone(&pager);
            async move { pager.refresh().await }
        });
        while !gate.entered.load(Ordering::SeqCst) {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }

        pager.set_anchor(0);
        let second = tokio::spawn({
            let pager = Arc::clone(&pager);
            async move { pager.refresh().await }
        });
        while *pager.generation.borrow() < 3 {
            tokio::task::yield_now().await;
        }
        for _ in 0..5 {
            tokio::task::yield_now().await;
        }
        gate.release();

        assert!(matches!(first.await.unwrap(), Err(PagingError::Superseded)));
        second.await.unwrap().unwrap();

        // Position 0 now holds page 3, so the second refresh reloads page 3
        // rather than falling back to page 1.
        assert_eq!(pager.fetcher().requested_pages(), [1, 2, 3, 3, 3]);
        assert_eq!(keys(&pager), ["p3/e1", "p3/e2"]);
        assert_eq!(pager.snapshot().generation, 2);
    }
}
