//! Crash recovery testing for the local store.
//!
//! [`CrashableBackend`] is an in-memory journal that can be told to "die"
//! after a number of bytes. A crashed backend keeps whatever bytes made it
//! in, including a partial frame, and refuses every further write, just as
//! a killed process would. Reopening a store over [`CrashControl::image`]
//! then exercises journal recovery.
//!
//! ## Usage
//!
//! ```rust
//! use pagesync_testkit::crash::CrashRecoveryHarness;
//!
//! let mut harness = CrashRecoveryHarness::new();
//! let result = harness.test_crash_during_commit();
//! assert!(result.passed, "{result:?}");
//! ```

use crate::fixtures::page_rows;
use crate::invariants::cursor_violations;
use pagesync_storage::{InMemoryBackend, StorageBackend, StorageError, StorageResult};
use pagesync_store::{LocalStore, StoreConfig, StoreResult};
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

/// Points at which a crash can be simulated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrashPoint {
    /// Crash before any byte of the commit frame is written.
    BeforeJournalWrite,
    /// Crash half way through the commit frame.
    DuringJournalWrite,
    /// Crash once the frame is written but while flushing it.
    DuringFlush,
}

/// Result of a crash recovery test.
#[derive(Debug, Clone)]
pub struct CrashRecoveryResult {
    /// Whether the test passed.
    pub passed: bool,
    /// Description of what was tested.
    pub description: String,
    /// Expected records after recovery.
    pub expected_records: usize,
    /// Actual records after recovery.
    pub actual_records: usize,
    /// Any error message.
    pub error: Option<String>,
}

impl CrashRecoveryResult {
    /// Creates a passing result.
    pub fn pass(description: &str, records: usize) -> Self {
        Self {
            passed: true,
            description: description.to_string(),
            expected_records: records,
            actual_records: records,
            error: None,
        }
    }

    /// Creates a failing result.
    pub fn fail(description: &str, expected: usize, actual: usize, error: &str) -> Self {
        Self {
            passed: false,
            description: description.to_string(),
            expected_records: expected,
            actual_records: actual,
            error: Some(error.to_string()),
        }
    }
}

/// Shared switchboard of a [`CrashableBackend`].
///
/// Stays with the test after the backend is moved into a store.
#[derive(Debug)]
pub struct CrashControl {
    image: RwLock<Vec<u8>>,
    crash_after_bytes: AtomicUsize,
    bytes_written: AtomicUsize,
    crashed: AtomicBool,
    fail_on_flush: AtomicBool,
}

impl CrashControl {
    fn new(image: Vec<u8>) -> Self {
        Self {
            image: RwLock::new(image),
            crash_after_bytes: AtomicUsize::new(usize::MAX),
            bytes_written: AtomicUsize::new(0),
            crashed: AtomicBool::new(false),
            fail_on_flush: AtomicBool::new(false),
        }
    }

    /// Crashes once `bytes` more bytes have been appended.
    pub fn crash_after(&self, bytes: usize) {
        let written = self.bytes_written.load(Ordering::SeqCst);
        self.crash_after_bytes
            .store(written.saturating_add(bytes), Ordering::SeqCst);
    }

    /// Crashes on the next flush or sync.
    pub fn set_fail_on_flush(&self, fail: bool) {
        self.fail_on_flush.store(fail, Ordering::SeqCst);
    }

    /// Clears the crash state; the image is kept.
    pub fn reset(&self) {
        self.crash_after_bytes.store(usize::MAX, Ordering::SeqCst);
        self.crashed.store(false, Ordering::SeqCst);
        self.fail_on_flush.store(false, Ordering::SeqCst);
    }

    /// Returns whether the backend has crashed.
    pub fn has_crashed(&self) -> bool {
        self.crashed.load(Ordering::SeqCst)
    }

    /// Returns the bytes that reached the journal.
    pub fn image(&self) -> Vec<u8> {
        self.image.read().clone()
    }

    /// Returns a fresh backend holding the journal image, as found on
    /// restart.
    pub fn reopen_backend(&self) -> InMemoryBackend {
        InMemoryBackend::with_data(self.image())
    }

    fn crash(&self, what: &str) -> StorageError {
        self.crashed.store(true, Ordering::SeqCst);
        StorageError::Io(std::io::Error::new(
            std::io::ErrorKind::Other,
            format!("simulated crash {what}"),
        ))
    }

    fn dead(&self) -> StorageResult<()> {
        if self.has_crashed() {
            return Err(StorageError::Io(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "backend crashed",
            )));
        }
        Ok(())
    }
}

/// A journal backend that can simulate crashes.
#[derive(Debug)]
pub struct CrashableBackend {
    control: Arc<CrashControl>,
}

impl CrashableBackend {
    /// Creates an empty crashable backend.
    pub fn new() -> Self {
        Self::with_data(Vec::new())
    }

    /// Creates a crashable backend over an existing journal image.
    pub fn with_data(image: Vec<u8>) -> Self {
        Self {
            control: Arc::new(CrashControl::new(image)),
        }
    }

    /// Returns the switchboard shared with this backend.
    pub fn control(&self) -> Arc<CrashControl> {
        Arc::clone(&self.control)
    }
}

impl Default for CrashableBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl StorageBackend for CrashableBackend {
    fn read_at(&self, offset: u64, len: usize) -> StorageResult<Vec<u8>> {
        let image = self.control.image.read();
        let size = image.len() as u64;
        let end = offset.saturating_add(len as u64);
        if end > size {
            return Err(StorageError::ReadPastEnd { offset, len, size });
        }
        Ok(image[offset as usize..end as usize].to_vec())
    }

    fn append(&mut self, data: &[u8]) -> StorageResult<u64> {
        let control = &self.control;
        control.dead()?;
        let len = data.len();
        let current = control.bytes_written.fetch_add(len, Ordering::SeqCst);
        let threshold = control.crash_after_bytes.load(Ordering::SeqCst);

        let mut image = control.image.write();
        let offset = image.len() as u64;
        if current >= threshold {
            return Err(control.crash("before write"));
        }
        if current + len > threshold {
            // Only the bytes before the crash point land.
            image.extend_from_slice(&data[..threshold - current]);
            return Err(control.crash("during write"));
        }
        image.extend_from_slice(data);
        Ok(offset)
    }

    fn flush(&mut self) -> StorageResult<()> {
        self.control.dead()?;
        if self.control.fail_on_flush.load(Ordering::SeqCst) {
            return Err(self.control.crash("during flush"));
        }
        Ok(())
    }

    fn size(&self) -> StorageResult<u64> {
        Ok(self.control.image.read().len() as u64)
    }

    fn sync(&mut self) -> StorageResult<()> {
        self.flush()
    }

    fn truncate(&mut self, new_size: u64) -> StorageResult<()> {
        self.control.dead()?;
        let mut image = self.control.image.write();
        let size = image.len() as u64;
        if new_size > size {
            return Err(StorageError::TruncateBeyondEnd {
                requested: new_size,
                size,
            });
        }
        image.truncate(new_size as usize);
        Ok(())
    }
}

/// Test harness for crash recovery scenarios.
#[derive(Debug, Default)]
pub struct CrashRecoveryHarness {
    /// Results of crash recovery tests.
    pub results: Vec<CrashRecoveryResult>,
}

impl CrashRecoveryHarness {
    /// Creates a new crash recovery harness.
    pub fn new() -> Self {
        Self::default()
    }

    /// Commits one page, crashes while committing a second, reopens, and
    /// checks the recovered cache.
    ///
    /// A frame cut short must be dropped, leaving the first page only. A
    /// frame that was fully written before the crash is durable, so both
    /// pages come back. Either way every record has its cursor row.
    pub fn test_crash_at(&mut self, point: CrashPoint) -> CrashRecoveryResult {
        let description = format!("crash {point:?} recovers a consistent cache");
        let expected = match point {
            CrashPoint::BeforeJournalWrite | CrashPoint::DuringJournalWrite => 3,
            CrashPoint::DuringFlush => 6,
        };
        let result = match Self::crash_and_recover(point) {
            Ok((actual, violations)) if !violations.is_empty() => {
                CrashRecoveryResult::fail(&description, expected, actual, &violations.join("; "))
            }
            Ok((actual, _)) if actual != expected => {
                CrashRecoveryResult::fail(&description, expected, actual, "unexpected record count")
            }
            Ok((actual, _)) => CrashRecoveryResult::pass(&description, actual),
            Err(e) => CrashRecoveryResult::fail(&description, expected, 0, &e),
        };
        self.results.push(result.clone());
        result
    }

    /// Crashes half way through a commit frame.
    pub fn test_crash_during_commit(&mut self) -> CrashRecoveryResult {
        self.test_crash_at(CrashPoint::DuringJournalWrite)
    }

    /// Runs every crash point.
    pub fn run_all(&mut self) -> bool {
        for point in [
            CrashPoint::BeforeJournalWrite,
            CrashPoint::DuringJournalWrite,
            CrashPoint::DuringFlush,
        ] {
            self.test_crash_at(point);
        }
        self.all_passed()
    }

    /// Returns true if every recorded result passed.
    pub fn all_passed(&self) -> bool {
        self.results.iter().all(|r| r.passed)
    }

    /// Returns the recovered record count and any consistency violations.
    fn crash_and_recover(point: CrashPoint) -> Result<(usize, Vec<String>), String> {
        let backend = CrashableBackend::new();
        let control = backend.control();
        let store = LocalStore::open(StoreConfig::default(), Box::new(backend))
            .map_err(|e| e.to_string())?;

        write_page(&store, 1).map_err(|e| e.to_string())?;

        match point {
            CrashPoint::BeforeJournalWrite => control.crash_after(0),
            CrashPoint::DuringJournalWrite => control.crash_after(16),
            CrashPoint::DuringFlush => control.set_fail_on_flush(true),
        }
        if write_page(&store, 2).is_ok() || !control.has_crashed() {
            return Err("commit did not crash".to_string());
        }
        if store.record_count() != 3 {
            return Err("crashed commit became visible".to_string());
        }
        drop(store);

        let recovered = LocalStore::open(StoreConfig::default(), Box::new(control.reopen_backend()))
            .map_err(|e| e.to_string())?;
        Ok((recovered.record_count(), cursor_violations(&recovered)))
    }
}

fn write_page(store: &LocalStore, page: u32) -> StoreResult<()> {
    let (records, keys) = page_rows(page, 3, false);
    store.transaction(|txn| {
        txn.upsert_remote_keys(keys);
        txn.upsert_records(records, page);
        Ok(())
    })
}
