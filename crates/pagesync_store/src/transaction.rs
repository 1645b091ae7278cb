//! Staged store transactions.

use crate::error::{StoreError, StoreResult};
use crate::schema::{Record, RemoteKey};
use serde::{Deserialize, Serialize};

/// State of a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    /// Writes may still be staged.
    Active,
    /// The writes were journaled and applied.
    Committed,
    /// The transaction was abandoned; nothing was written.
    Aborted,
}

/// One staged table mutation.
///
/// A committed transaction is journaled as the ordered list of its writes and
/// replayed in the same order on recovery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TableWrite {
    /// Delete every row of the record table.
    ClearRecords,
    /// Delete every row of the cursor table.
    ClearRemoteKeys,
    /// Insert or replace cursor rows.
    UpsertRemoteKeys(Vec<RemoteKey>),
    /// Insert or replace record rows, all tagged with `page`.
    UpsertRecords {
        /// Remote page the records were fetched under.
        page: u32,
        /// Records in fetch order.
        records: Vec<Record>,
    },
}

/// A set of writes applied to the store as one unit.
///
/// Obtained through [`crate::LocalStore::transaction`]. Nothing staged here is
/// visible to readers until the closure returns `Ok` and the commit lands.
#[derive(Debug)]
pub struct StoreTransaction {
    writes: Vec<TableWrite>,
    state: TransactionState,
}

impl StoreTransaction {
    pub(crate) fn new() -> Self {
        Self {
            writes: Vec::new(),
            state: TransactionState::Active,
        }
    }

    /// Stages deletion of all record rows.
    pub fn clear_records(&mut self) {
        self.writes.push(TableWrite::ClearRecords);
    }

    /// Stages deletion of all cursor rows.
    pub fn clear_remote_keys(&mut self) {
        self.writes.push(TableWrite::ClearRemoteKeys);
    }

    /// Stages an insert-or-replace of cursor rows.
    pub fn upsert_remote_keys(&mut self, keys: Vec<RemoteKey>) {
        if !keys.is_empty() {
            self.writes.push(TableWrite::UpsertRemoteKeys(keys));
        }
    }

    /// Stages an insert-or-replace of record rows fetched under `page`.
    pub fn upsert_records(&mut self, records: Vec<Record>, page: u32) {
        if !records.is_empty() {
            let write = TableWrite::UpsertRecords { page, records };
            self.writes.push(write);
        }
    }

    /// Abandons the transaction with a reason.
    ///
    /// Return the error from the transaction closure to roll back.
    pub fn abort(&mut self, reason: impl Into<String>) -> StoreError {
        self.state = TransactionState::Aborted;
        self.writes.clear();
        StoreError::aborted(reason)
    }

    /// Returns the staged writes in order.
    #[must_use]
    pub fn writes(&self) -> &[TableWrite] {
        &self.writes
    }

    /// Returns the number of staged writes.
    #[must_use]
    pub fn write_count(&self) -> usize {
        self.writes.len()
    }

    /// Returns the current state.
    #[must_use]
    pub fn state(&self) -> TransactionState {
        self.state
    }

    pub(crate) fn ensure_active(&self) -> StoreResult<()> {
        match self.state {
            TransactionState::Active => Ok(()),
            TransactionState::Committed => {
                Err(StoreError::aborted("transaction already committed"))
            }
            TransactionState::Aborted => Err(StoreError::aborted("transaction already aborted")),
        }
    }

    pub(crate) fn take_writes(&mut self) -> Vec<TableWrite> {
        std::mem::take(&mut self.writes)
    }

    pub(crate) fn mark_committed(&mut self) {
        self.state = TransactionState::Committed;
    }

    pub(crate) fn mark_aborted(&mut self) {
        self.state = TransactionState::Aborted;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_transaction_is_active_and_empty() {
        let txn = StoreTransaction::new();
        assert_eq!(txn.state(), TransactionState::Active);
        assert_eq!(txn.write_count(), 0);
    }

    #[test]
    fn writes_keep_staging_order() {
        let mut txn = StoreTransaction::new();
        txn.clear_remote_keys();
        txn.clear_records();
        txn.upsert_remote_keys(vec![RemoteKey::new("a", None, Some(2))]);
        txn.upsert_records(vec![Record::new("a", "A")], 1);

        assert!(matches!(
            txn.writes(),
            [
                TableWrite::ClearRemoteKeys,
                TableWrite::ClearRecords,
                TableWrite::UpsertRemoteKeys(_),
                TableWrite::UpsertRecords { page: 1, .. }
            ]
        ));
    }

    #[test]
    fn empty_upserts_are_not_staged() {
        let mut txn = StoreTransaction::new();
        txn.upsert_records(Vec::new(), 3);
        txn.upsert_remote_keys(Vec::new());
        assert_eq!(txn.write_count(), 0);
    }

    #[test]
    fn abort_discards_staged_writes() {
        let mut txn = StoreTransaction::new();
        txn.clear_records();
        let err = txn.abort("fault injected");

        assert!(matches!(err, StoreError::TransactionAborted { .. }));
        assert_eq!(txn.write_count(), 0);
        assert!(txn.ensure_active().is_err());
    }

    #[test]
    fn committed_transaction_is_not_active() {
        let mut txn = StoreTransaction::new();
        txn.mark_committed();
        assert!(txn.ensure_active().is_err());
    }
}
