//! # pagesync store
//!
//! The durable local cache behind a paging session.
//!
//! The store holds two tables that always move together:
//! - the record table: every cached [`Record`] tagged with the page it was
//!   fetched under ([`CachedRecord`])
//! - the cursor table: one [`RemoteKey`] per cached record naming the
//!   previous and next remote page
//!
//! ## Key Invariants
//!
//! - Record keys are unique; writing an existing key replaces the row
//! - All writes go through [`LocalStore::transaction`]; a reader never sees
//!   a record without its cursor row, or the reverse
//! - Every commit is one checksummed journal frame; recovery drops a torn
//!   tail, so a crash mid-commit leaves the previous state
//! - A commit that clears both tables first restarts the journal, so its
//!   size tracks the live cache rather than its history
//!
//! ## Example
//!
//! ```rust
//! use pagesync_store::{LocalStore, Record, RemoteKey};
//!
//! let store = LocalStore::in_memory();
//! store
//!     .transaction(|txn| {
//!         txn.upsert_remote_keys(vec![RemoteKey::new("a", None, Some(2))]);
//!         txn.upsert_records(vec![Record::new("a", "first")], 1);
//!         Ok(())
//!     })
//!     .unwrap();
//!
//! assert_eq!(store.record_count(), 1);
//! assert_eq!(store.remote_key("a").unwrap().next_page, Some(2));
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod error;
mod journal;
mod schema;
mod store;
mod tables;
mod transaction;

pub use config::StoreConfig;
pub use error::{StoreError, StoreResult};
pub use journal::{compute_crc32, JOURNAL_MAGIC};
pub use schema::{CachedRecord, Record, RemoteKey};
pub use store::{LocalStore, RecordWindow};
pub use transaction::{StoreTransaction, TableWrite, TransactionState};
