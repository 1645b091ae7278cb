//! Property-based test generators.
//!
//! Provides proptest strategies for generating records, remote page
//! shapes and paging session operations.

use crate::fixtures::page_rows;
use pagesync_engine::{Direction, PagerConfig, SyntheticFetcher};
use pagesync_store::{Record, RemoteKey};
use proptest::prelude::*;

/// Strategy for generating record keys.
pub fn arb_record_key() -> impl Strategy<Value = String> {
    "[a-z]{1,8}/[0-9]{1,3}"
}

/// Strategy for generating record payloads.
pub fn arb_record_value() -> impl Strategy<Value = String> {
    prop_oneof![Just(String::new()), "[ -~]{1,32}", "\\PC{1,64}"]
}

/// Strategy for generating records.
pub fn arb_record() -> impl Strategy<Value = Record> {
    (arb_record_key(), arb_record_value()).prop_map(|(key, value)| Record::new(key, value))
}

/// Strategy for generating one page worth of rows with valid cursors.
pub fn arb_page_rows(
    max_page: u32,
    max_len: usize,
) -> impl Strategy<Value = (u32, Vec<Record>, Vec<RemoteKey>)> {
    (1..=max_page.max(1), 1..=max_len.max(1), any::<bool>()).prop_map(|(page, len, last)| {
        let (records, keys) = page_rows(page, len, last);
        (page, records, keys)
    })
}

/// The shape of a synthetic remote source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RemoteShape {
    /// Records per full page.
    pub page_size: u32,
    /// Last page holding data.
    pub last_page: u32,
    /// Length of the last page, at most `page_size`.
    pub last_page_len: u32,
}

impl RemoteShape {
    /// Builds a fetcher serving this shape.
    pub fn fetcher(&self) -> SyntheticFetcher {
        SyntheticFetcher::new()
            .with_last_page(self.last_page)
            .with_short_page(self.last_page, self.last_page_len)
    }

    /// Builds a pager config paging this shape.
    pub fn config(&self) -> PagerConfig {
        PagerConfig::new(self.page_size)
    }

    /// Returns the total number of records on the remote.
    pub fn total_records(&self) -> usize {
        ((self.last_page - 1) * self.page_size + self.last_page_len) as usize
    }
}

/// Strategy for generating remote shapes.
pub fn arb_remote_shape() -> impl Strategy<Value = RemoteShape> {
    (1u32..=6, 1u32..=6)
        .prop_flat_map(|(page_size, last_page)| {
            (Just(page_size), Just(last_page), 1..=page_size)
        })
        .prop_map(|(page_size, last_page, last_page_len)| RemoteShape {
            page_size,
            last_page,
            last_page_len,
        })
}

/// An operation on a paging session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionOp {
    /// Refresh around the given position.
    Refresh {
        /// Position to anchor before refreshing.
        anchor: Option<usize>,
    },
    /// Load more at one end.
    LoadMore(Direction),
    /// Read an item, possibly prefetching.
    Access(usize),
}

/// Strategy for generating session operations.
pub fn arb_session_op() -> impl Strategy<Value = SessionOp> {
    prop_oneof![
        1 => proptest::option::of(0usize..40).prop_map(|anchor| SessionOp::Refresh { anchor }),
        3 => Just(SessionOp::LoadMore(Direction::Append)),
        1 => Just(SessionOp::LoadMore(Direction::Prepend)),
        1 => (0usize..40).prop_map(SessionOp::Access),
    ]
}

/// Strategy for generating a sequence of session operations.
pub fn arb_session_ops(max_ops: usize) -> impl Strategy<Value = Vec<SessionOp>> {
    prop::collection::vec(arb_session_op(), 1..=max_ops.max(1))
}
