//! In-memory image of the two cache tables.

use crate::schema::{CachedRecord, RemoteKey};
use crate::transaction::TableWrite;
use std::collections::{BTreeMap, HashMap};

/// Record table, cursor table and the ordered index over records.
///
/// `order` maps `(page, sequence)` to the record key and is the only source
/// of row order for paged reads.
#[derive(Debug, Default)]
pub(crate) struct Tables {
    records: HashMap<String, CachedRecord>,
    order: BTreeMap<(u32, u64), String>,
    remote_keys: HashMap<String, RemoteKey>,
    next_sequence: u64,
}

impl Tables {
    pub fn apply(&mut self, write: &TableWrite) {
        match write {
            TableWrite::ClearRecords => {
                self.records.clear();
                self.order.clear();
            }
            TableWrite::ClearRemoteKeys => self.remote_keys.clear(),
            TableWrite::UpsertRemoteKeys(keys) => {
                for key in keys {
                    self.remote_keys.insert(key.record_key.clone(), key.clone());
                }
            }
            TableWrite::UpsertRecords { page, records } => {
                for record in records {
                    let sequence = self.next_sequence;
                    self.next_sequence += 1;

                    let row = CachedRecord {
                        record: record.clone(),
                        page: *page,
                        sequence,
                    };
                    if let Some(old) = self.records.insert(record.key.clone(), row) {
                        self.order.remove(&(old.page, old.sequence));
                    }
                    self.order.insert((*page, sequence), record.key.clone());
                }
            }
        }
    }

    pub fn record(&self, key: &str) -> Option<&CachedRecord> {
        self.records.get(key)
    }

    pub fn remote_key(&self, record_key: &str) -> Option<&RemoteKey> {
        self.remote_keys.get(record_key)
    }

    pub fn record_count(&self) -> usize {
        self.records.len()
    }

    pub fn remote_key_count(&self) -> usize {
        self.remote_keys.len()
    }

    /// Rows `offset..offset + limit` ordered by page then fetch order.
    pub fn records_page(&self, offset: usize, limit: usize) -> Vec<CachedRecord> {
        self.order
            .values()
            .skip(offset)
            .take(limit)
            .filter_map(|key| self.records.get(key).cloned())
            .collect()
    }

    /// Writes that rebuild the current tables from nothing.
    pub fn checkpoint_writes(&self) -> Vec<TableWrite> {
        let mut writes = vec![
            TableWrite::ClearRemoteKeys,
            TableWrite::ClearRecords,
            TableWrite::UpsertRemoteKeys(self.remote_keys.values().cloned().collect()),
        ];
        for row in self.records_page(0, usize::MAX) {
            match writes.last_mut() {
                Some(TableWrite::UpsertRecords { page, records }) if *page == row.page => {
                    records.push(row.record);
                }
                _ => writes.push(TableWrite::UpsertRecords {
                    page: row.page,
                    records: vec![row.record],
                }),
            }
        }
        writes
    }
}
