//! Cache-free page loading straight from the remote.

use crate::error::TransientFetchError;
use crate::fetcher::{fetch_with_timeout, RemoteFetcher};
use crate::model::{Page, PagingState, INITIAL_PAGE};
use pagesync_store::Record;
use std::time::Duration;
use tracing::debug;

/// Loads pages on demand, keyed by remote page number.
///
/// Nothing is persisted. Each page's keys are derived from the response:
/// a page shorter than requested is taken as the end of the data.
#[derive(Debug)]
pub struct PagingSource<F> {
    fetcher: F,
    fetch_timeout: Duration,
}

impl<F: RemoteFetcher> PagingSource<F> {
    /// Creates a source over `fetcher`.
    pub fn new(fetcher: F, fetch_timeout: Duration) -> Self {
        Self {
            fetcher,
            fetch_timeout,
        }
    }

    /// Returns the underlying fetcher.
    pub fn fetcher(&self) -> &F {
        &self.fetcher
    }

    /// Loads the page for `key`, or the first page when `key` is `None`.
    ///
    /// # Errors
    ///
    /// Returns the fetch error verbatim; nothing is recorded on failure.
    pub async fn load(
        &self,
        key: Option<u32>,
        requested_size: u32,
    ) -> Result<Page<u32, Record>, TransientFetchError> {
        let page = key.unwrap_or(INITIAL_PAGE);
        let fetched =
            fetch_with_timeout(&self.fetcher, page, requested_size, self.fetch_timeout).await?;

        let full = fetched.records.len() == requested_size as usize;
        let next_key = full.then(|| page + 1);
        let prev_key = (page > INITIAL_PAGE).then(|| page - 1);

        debug!(
            page,
            records = fetched.records.len(),
            ?prev_key,
            ?next_key,
            "paging source loaded page"
        );
        Ok(Page::new(fetched.records, prev_key, next_key))
    }

    /// Picks the page to reload so the consumer resumes near its anchor.
    ///
    /// Takes the page closest to the anchor and returns the key that loads
    /// it again: one past its previous key, else one before its next key.
    pub fn refresh_key<T>(state: PagingState<'_, u32, T>) -> Option<u32> {
        let anchor = state.anchor_position?;
        let page = state.closest_page_to_position(anchor)?;
        page.prev_key
            .map(|prev| prev + 1)
            .or_else(|| page.next_key.and_then(|next| next.checked_sub(1)))
    }
}
