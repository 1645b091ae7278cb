//! Remote fetch boundary.
//!
//! The engine needs exactly one thing from the remote side: "give me page N
//! of size S". [`RemoteFetcher`] is that seam. [`SyntheticFetcher`] is an
//! in-process implementation that generates deterministic records and can
//! be scripted with latency, short pages and faults.

use crate::error::TransientFetchError;
use crate::model::FetchResult;
use async_trait::async_trait;
use pagesync_store::Record;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// Fetches pages of records from the remote source.
///
/// Pages are numbered from 1. An empty result means there is no data at or
/// past `page`.
#[async_trait]
pub trait RemoteFetcher: Send + Sync {
    /// Fetches page `page` holding at most `page_size` records.
    async fn fetch_page(
        &self,
        page: u32,
        page_size: u32,
    ) -> Result<Vec<Record>, TransientFetchError>;
}

#[async_trait]
impl<F: RemoteFetcher + ?Sized> RemoteFetcher for Arc<F> {
    async fn fetch_page(
        &self,
        page: u32,
        page_size: u32,
    ) -> Result<Vec<Record>, TransientFetchError> {
        (**self).fetch_page(page, page_size).await
    }
}

/// Fetches one page, failing with a timeout error once `timeout` elapses.
///
/// # Errors
///
/// Returns the fetcher's error verbatim, or a [`TransientFetchError`]
/// flagged as a timeout.
pub async fn fetch_with_timeout<F: RemoteFetcher + ?Sized>(
    fetcher: &F,
    page: u32,
    page_size: u32,
    timeout: Duration,
) -> Result<FetchResult, TransientFetchError> {
    match tokio::time::timeout(timeout, fetcher.fetch_page(page, page_size)).await {
        Ok(Ok(records)) => Ok(FetchResult::from_records(records)),
        Ok(Err(e)) => Err(e),
        Err(_) => Err(TransientFetchError::timed_out(timeout)),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FaultRule {
    OnceOnPage { page: u32, fired: bool },
    AlwaysOnPage { page: u32 },
    OnCall { call: u64 },
}

#[derive(Debug, Default)]
struct FaultState {
    rules: Vec<FaultRule>,
    calls: u64,
    triggered: u64,
}

/// Scripted failures for a fetcher, owned by whoever builds the test.
///
/// Every fetch consults the schedule first. A rule that matches makes the
/// fetch fail with a [`TransientFetchError`].
///
/// ```
/// use pagesync_engine::FaultSchedule;
///
/// let faults = FaultSchedule::new().fail_once_on_page(6);
/// assert!(faults.check(6).is_err());
/// assert!(faults.check(6).is_ok());
/// ```
#[derive(Debug, Default)]
pub struct FaultSchedule {
    state: Mutex<FaultState>,
    message: Option<String>,
}

impl FaultSchedule {
    /// Creates an empty schedule that never fails.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the message carried by injected errors.
    #[must_use]
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    /// Fails the first fetch of `page`, then lets it through.
    #[must_use]
    pub fn fail_once_on_page(self, page: u32) -> Self {
        self.push(FaultRule::OnceOnPage { page, fired: false })
    }

    /// Fails every fetch of `page`.
    #[must_use]
    pub fn fail_always_on_page(self, page: u32) -> Self {
        self.push(FaultRule::AlwaysOnPage { page })
    }

    /// Fails the `call`-th fetch (1-based) whatever page it asks for.
    #[must_use]
    pub fn fail_on_call(self, call: u64) -> Self {
        self.push(FaultRule::OnCall { call })
    }

    fn push(self, rule: FaultRule) -> Self {
        self.state.lock().rules.push(rule);
        self
    }

    /// Records a fetch of `page` and reports whether it must fail.
    ///
    /// # Errors
    ///
    /// Returns the injected error when a rule matches.
    pub fn check(&self, page: u32) -> Result<(), TransientFetchError> {
        let mut state = self.state.lock();
        state.calls += 1;
        let call = state.calls;

        let mut fail = false;
        for rule in &mut state.rules {
            match rule {
                FaultRule::OnceOnPage { page: p, fired } if *p == page && !*fired => {
                    *fired = true;
                    fail = true;
                }
                FaultRule::AlwaysOnPage { page: p } if *p == page => fail = true,
                FaultRule::OnCall { call: c } if *c == call => fail = true,
                _ => {}
            }
        }

        if fail {
            state.triggered += 1;
            let message = self.message.as_deref().unwrap_or("Bad internet connection");
            return Err(TransientFetchError::new(message));
        }
        Ok(())
    }

    /// Returns the number of fetches checked so far.
    #[must_use]
    pub fn calls(&self) -> u64 {
        self.state.lock().calls
    }

    /// Returns the number of injected failures.
    #[must_use]
    pub fn triggered(&self) -> u64 {
        self.state.lock().triggered
    }
}

/// Deterministic in-process remote source.
///
/// Page `p` of size `s` holds records `p{p}/e1` through `p{p}/e{s}`, so a
/// repeated fetch always returns the same records.
#[derive(Debug, Default)]
pub struct SyntheticFetcher {
    latency: Duration,
    last_page: Option<u32>,
    short_pages: HashMap<u32, u32>,
    faults: Option<Arc<FaultSchedule>>,
    requested: Mutex<Vec<u32>>,
}

impl SyntheticFetcher {
    /// Creates a fetcher with unbounded data and no latency.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sleeps for `latency` before answering each fetch.
    #[must_use]
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Makes every page after `page` empty.
    #[must_use]
    pub fn with_last_page(mut self, page: u32) -> Self {
        self.last_page = Some(page);
        self
    }

    /// Caps `page` at `len` records.
    #[must_use]
    pub fn with_short_page(mut self, page: u32, len: u32) -> Self {
        self.short_pages.insert(page, len);
        self
    }

    /// Makes `page` come back empty.
    #[must_use]
    pub fn with_empty_page(self, page: u32) -> Self {
        self.with_short_page(page, 0)
    }

    /// Consults `faults` before every fetch.
    #[must_use]
    pub fn with_faults(mut self, faults: Arc<FaultSchedule>) -> Self {
        self.faults = Some(faults);
        self
    }

    /// Returns the records a successful fetch of `page` would produce.
    #[must_use]
    pub fn records_for(&self, page: u32, page_size: u32) -> Vec<Record> {
        if page == 0 || self.last_page.is_some_and(|last| page > last) {
            return Vec::new();
        }
        let len = self
            .short_pages
            .get(&page)
            .map_or(page_size, |&short| short.min(page_size));
        (1..=len)
            .map(|i| Record::new(format!("p{page}/e{i}"), format!("Item {i} of page {page}")))
            .collect()
    }

    /// Returns every page requested so far, in call order.
    #[must_use]
    pub fn requested_pages(&self) -> Vec<u32> {
        self.requested.lock().clone()
    }

    /// Returns the number of fetches made.
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.requested.lock().len()
    }
}

#[async_trait]
impl RemoteFetcher for SyntheticFetcher {
    async fn fetch_page(
        &self,
        page: u32,
        page_size: u32,
    ) -> Result<Vec<Record>, TransientFetchError> {
        self.requested.lock().push(page);
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        if let Some(faults) = &self.faults {
            faults.check(page)?;
        }
        Ok(self.records_for(page, page_size))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn pages_are_deterministic() {
        let fetcher = SyntheticFetcher::new();
        let first = fetcher.fetch_page(2, 3).await.unwrap();
        let second = fetcher.fetch_page(2, 3).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(first[0], Record::new("p2/e1", "Item 1 of page 2"));
        assert_eq!(fetcher.requested_pages(), [2, 2]);
    }

    #[tokio::test]
    async fn scripted_page_shapes() {
        let fetcher = SyntheticFetcher::new()
            .with_last_page(4)
            .with_short_page(3, 2)
            .with_empty_page(2);

        assert_eq!(fetcher.fetch_page(1, 5).await.unwrap().len(), 5);
        assert!(fetcher.fetch_page(2, 5).await.unwrap().is_empty());
        assert_eq!(fetcher.fetch_page(3, 5).await.unwrap().len(), 2);
        assert!(fetcher.fetch_page(5, 5).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn fail_once_then_succeed() {
        let faults = Arc::new(FaultSchedule::new().fail_once_on_page(6));
        let fetcher = SyntheticFetcher::new().with_faults(Arc::clone(&faults));

        let err = fetcher.fetch_page(6, 2).await.unwrap_err();
        assert_eq!(err.message(), "Bad internet connection");
        assert_eq!(fetcher.fetch_page(6, 2).await.unwrap().len(), 2);
        assert_eq!(faults.calls(), 2);
        assert_eq!(faults.triggered(), 1);
    }

    #[test]
    fn fault_rules() {
        let faults = FaultSchedule::new()
            .with_message("offline")
            .fail_always_on_page(2)
            .fail_on_call(3);

        assert!(faults.check(1).is_ok());
        assert!(faults.check(2).is_err());
        assert_eq!(faults.check(1).unwrap_err().message(), "offline");
        assert!(faults.check(1).is_ok());
        assert!(faults.check(2).is_err());
        assert_eq!(faults.triggered(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_fetch_times_out() {
        let fetcher = SyntheticFetcher::new().with_latency(Duration::from_secs(60));
        let err = fetch_with_timeout(&fetcher, 1, 10, Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(err.is_timeout());
    }

    #[tokio::test]
    async fn fetch_through_arc() {
        let fetcher: Arc<dyn RemoteFetcher> = Arc::new(SyntheticFetcher::new().with_last_page(1));
        let result = fetch_with_timeout(&fetcher, 2, 10, Duration::from_secs(1))
            .await
            .unwrap();
        assert!(result.end_of_pagination);
    }
}
