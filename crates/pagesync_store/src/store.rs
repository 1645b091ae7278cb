//! The local store.

use crate::config::StoreConfig;
use crate::error::StoreResult;
use crate::journal::{self, JournalEntry};
use crate::schema::{CachedRecord, RemoteKey};
use crate::tables::Tables;
use crate::transaction::StoreTransaction;
use pagesync_storage::{InMemoryBackend, StorageBackend};
use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, warn};

/// A consistent slice of the record table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordWindow {
    /// Rows in read order.
    pub rows: Vec<CachedRecord>,
    /// Number of rows in the whole table.
    pub total: usize,
}

/// Durable cache of paged records and their pagination cursors.
///
/// ## Single-Writer Guarantee
///
/// Commits are serialised on the journal lock, which is held from the
/// journal append until the tables are updated. Readers take the table lock
/// only, so they observe either the state before a commit or after it.
///
/// ## Recovery
///
/// [`LocalStore::open`] replays the journal. A torn tail left by an
/// interrupted commit is truncated, so the store comes back exactly as of
/// the last completed commit.
///
/// ## Compaction
///
/// A commit whose first writes clear both tables makes every earlier frame
/// dead, so the journal is truncated before that commit's frame goes in.
/// A crash between the two reopens an empty cache. If the append fails
/// without a crash, the live tables are written back as one frame.
pub struct LocalStore {
    config: StoreConfig,
    journal: Mutex<Box<dyn StorageBackend>>,
    tables: RwLock<Tables>,
    version: AtomicU64,
}

impl LocalStore {
    /// Opens a store over `backend`, replaying any journaled commits.
    ///
    /// # Errors
    ///
    /// Returns an error if the journal cannot be read, or if a frame in the
    /// middle of the journal is corrupt.
    pub fn open(config: StoreConfig, mut backend: Box<dyn StorageBackend>) -> StoreResult<Self> {
        let bytes = backend.read_all()?;
        let replay = journal::replay(&bytes)?;

        if replay.has_torn_tail(bytes.len() as u64) {
            warn!(
                valid_len = replay.valid_len,
                dropped = bytes.len() as u64 - replay.valid_len,
                "dropping torn journal tail"
            );
            backend.truncate(replay.valid_len)?;
        }

        let mut tables = Tables::default();
        let mut version = 0;
        for entry in &replay.entries {
            for write in &entry.writes {
                tables.apply(write);
            }
            version = entry.commit;
        }

        debug!(
            commits = replay.entries.len(),
            records = tables.record_count(),
            remote_keys = tables.remote_key_count(),
            "local store opened"
        );

        Ok(Self {
            config,
            journal: Mutex::new(backend),
            tables: RwLock::new(tables),
            version: AtomicU64::new(version),
        })
    }

    /// Creates an empty, non-durable store.
    #[must_use]
    pub fn in_memory() -> Self {
        Self {
            config: StoreConfig::default(),
            journal: Mutex::new(Box::new(InMemoryBackend::new())),
            tables: RwLock::new(Tables::default()),
            version: AtomicU64::new(0),
        }
    }

    /// Executes `f` within a transaction.
    ///
    /// If `f` returns `Ok`, the staged writes are journaled and applied as
    /// one unit. If it returns `Err`, nothing is written.
    ///
    /// # Errors
    ///
    /// Returns the closure's error, or a storage error if the commit could
    /// not be journaled. In both cases the store is unchanged.
    pub fn transaction<F, T>(&self, f: F) -> StoreResult<T>
    where
        F: FnOnce(&mut StoreTransaction) -> StoreResult<T>,
    {
        let mut txn = StoreTransaction::new();
        match f(&mut txn) {
            Ok(result) => {
                self.commit(&mut txn)?;
                Ok(result)
            }
            Err(e) => {
                txn.mark_aborted();
                Err(e)
            }
        }
    }

    fn commit(&self, txn: &mut StoreTransaction) -> StoreResult<()> {
        txn.ensure_active()?;
        let writes = txn.take_writes();
        if writes.is_empty() {
            txn.mark_committed();
            return Ok(());
        }

        let mut journal = self.journal.lock();
        let commit = self.version.load(Ordering::SeqCst) + 1;
        let entry = JournalEntry { commit, writes };
        let frame = journal::encode_frame(&entry)?;

        // Frames before a full reset are dead; drop them instead of
        // replaying them on every open.
        let resets = entry.resets_tables();
        let start = if resets {
            let dropped = journal.size()?;
            journal.truncate(0)?;
            debug!(commit, dropped, "journal compacted");
            0
        } else {
            journal.size()?
        };

        if let Err(e) = self.append_frame(&mut **journal, &frame) {
            // Leave no half-written frame behind for recovery to misread.
            if let Err(truncate_err) = journal.truncate(start) {
                warn!(error = %truncate_err, "failed to roll back journal tail");
            } else if resets {
                self.restore_checkpoint(&mut **journal);
            }
            txn.mark_aborted();
            return Err(e);
        }

        {
            let mut tables = self.tables.write();
            for write in &entry.writes {
                tables.apply(write);
            }
            self.version.store(commit, Ordering::SeqCst);
        }
        txn.mark_committed();

        debug!(commit, writes = entry.writes.len(), "store commit applied");
        Ok(())
    }

    /// Rewrites the live tables as one frame after a failed reset left the
    /// journal empty.
    fn restore_checkpoint(&self, journal: &mut dyn StorageBackend) {
        let entry = JournalEntry {
            commit: self.version.load(Ordering::SeqCst),
            writes: self.tables.read().checkpoint_writes(),
        };
        let frame = journal::encode_frame(&entry);
        if let Err(e) = frame.and_then(|frame| self.append_frame(journal, &frame)) {
            warn!(error = %e, "failed to restore journal checkpoint");
        }
    }

    fn append_frame(&self, journal: &mut dyn StorageBackend, frame: &[u8]) -> StoreResult<()> {
        journal.append(frame)?;
        journal.flush()?;
        if self.config.sync_on_commit {
            journal.sync()?;
        }
        Ok(())
    }

    /// Looks up the cursor row of a record.
    #[must_use]
    pub fn remote_key(&self, record_key: &str) -> Option<RemoteKey> {
        self.tables.read().remote_key(record_key).cloned()
    }

    /// Looks up a cached record by key.
    #[must_use]
    pub fn record(&self, key: &str) -> Option<CachedRecord> {
        self.tables.read().record(key).cloned()
    }

    /// Reads up to `limit` rows starting at row `offset`, ordered by page
    /// ascending then fetch order.
    #[must_use]
    pub fn records_page(&self, offset: usize, limit: usize) -> Vec<CachedRecord> {
        self.tables.read().records_page(offset, limit)
    }

    /// Reads rows `offset..offset + limit` together with the total row count,
    /// both under one lock.
    #[must_use]
    pub fn read_window(&self, offset: usize, limit: usize) -> RecordWindow {
        let tables = self.tables.read();
        RecordWindow {
            rows: tables.records_page(offset, limit),
            total: tables.record_count(),
        }
    }

    /// Returns every cached row in read order.
    #[must_use]
    pub fn all_records(&self) -> Vec<CachedRecord> {
        self.tables.read().records_page(0, usize::MAX)
    }

    /// Returns the number of cached records.
    #[must_use]
    pub fn record_count(&self) -> usize {
        self.tables.read().record_count()
    }

    /// Returns the number of cursor rows.
    #[must_use]
    pub fn remote_key_count(&self) -> usize {
        self.tables.read().remote_key_count()
    }

    /// Returns the number of the last applied commit.
    ///
    /// Readers compare versions to detect that their view was invalidated.
    #[must_use]
    pub fn version(&self) -> u64 {
        self.version.load(Ordering::SeqCst)
    }
}

impl std::fmt::Debug for LocalStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalStore")
            .field("version", &self.version())
            .field("records", &self.record_count())
            .field("remote_keys", &self.remote_key_count())
            .finish_non_exhaustive()
    }
}
