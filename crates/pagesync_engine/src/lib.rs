//! # pagesync engine
//!
//! Paged loading of remote data into one continuous sequence, optionally
//! backed by a durable local cache.
//!
//! Two ways of building the sequence are offered:
//!
//! - **Cache-free**: a [`PagingSource`] fetches pages straight from a
//!   [`RemoteFetcher`] and derives the neighbouring page keys from each
//!   response.
//! - **Cache-backed**: a [`SyncMediator`] fetches pages into a
//!   [`pagesync_store::LocalStore`], keeping one [`pagesync_store::RemoteKey`]
//!   cursor per cached record, and a [`CacheReader`] serves the cached rows.
//!
//! A [`Pager`] wires either into a session with refresh, retry, load states
//! and a stream of [`PagingSnapshot`]s.
//!
//! ## Invariants
//!
//! - A fetched page is committed in one transaction together with its
//!   cursors; a failed fetch changes nothing
//! - A refresh clears the cache only once its fetch has succeeded
//! - An append or prepend issued before the first refresh landed does not
//!   fetch and reports that more data may exist
//! - Every fetch is bounded by [`PagerConfig::fetch_timeout`]; elapsing is
//!   a [`TransientFetchError`]
//!
//! ## Example
//!
//! ```rust
//! use pagesync_engine::{Direction, Pager, PagerConfig, SyntheticFetcher};
//! use pagesync_store::LocalStore;
//! use std::sync::Arc;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> pagesync_engine::PagingResult<()> {
//! let store = Arc::new(LocalStore::in_memory());
//! let fetcher = SyntheticFetcher::new().with_last_page(2);
//! let pager = Pager::with_mediator(fetcher, store, PagerConfig::new(10))?;
//!
//! pager.refresh().await?;
//! pager.load_more(Direction::Append).await?;
//! pager.load_more(Direction::Append).await?;
//!
//! let snapshot = pager.snapshot();
//! assert_eq!(snapshot.len(), 20);
//! assert!(snapshot.load_states.append.end_of_pagination());
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod cache_reader;
mod config;
mod error;
mod fetcher;
mod load_state;
mod mediator;
mod model;
mod pager;
mod paging_source;

pub use async_trait::async_trait;
pub use cache_reader::CacheReader;
pub use config::{InitializeAction, PagerConfig, RetryConfig};
pub use error::{PagingError, PagingResult, TransientFetchError};
pub use fetcher::{fetch_with_timeout, FaultSchedule, RemoteFetcher, SyntheticFetcher};
pub use load_state::{LoadState, LoadStates, PagingSnapshot};
pub use mediator::SyncMediator;
pub use model::{
    Direction, FetchResult, LoadType, MediatorResult, Page, PageRequest, PagingState, INITIAL_PAGE,
};
pub use pager::{Pager, PagerStats};
pub use paging_source::PagingSource;
