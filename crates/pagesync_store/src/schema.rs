//! Rows held by the local store.

use serde::{Deserialize, Serialize};

/// One item fetched from the remote source.
///
/// `key` is the item identity; it is unique across the cache.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Record {
    /// Unique item identity.
    pub key: String,
    /// Display value.
    pub value: String,
}

impl Record {
    /// Creates a record.
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// A record as stored in the cache table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedRecord {
    /// The cached item.
    pub record: Record,
    /// Remote page the record was fetched under.
    pub page: u32,
    /// Insertion sequence; orders rows within a page by fetch order.
    pub sequence: u64,
}

impl CachedRecord {
    /// Returns the record key.
    #[must_use]
    pub fn key(&self) -> &str {
        &self.record.key
    }
}

/// Pagination cursor for one cached record.
///
/// `prev_page` is `None` only for records of the first remote page;
/// `next_page` is `None` only when the fetch that produced the record hit
/// the end of the remote data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteKey {
    /// Key of the record this cursor belongs to.
    pub record_key: String,
    /// Page before the record's page.
    pub prev_page: Option<u32>,
    /// Page after the record's page.
    pub next_page: Option<u32>,
}

impl RemoteKey {
    /// Creates a cursor row.
    pub fn new(
        record_key: impl Into<String>,
        prev_page: Option<u32>,
        next_page: Option<u32>,
    ) -> Self {
        Self {
            record_key: record_key.into(),
            prev_page,
            next_page,
        }
    }
}
