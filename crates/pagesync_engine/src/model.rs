//! Requests, results and loaded pages.

use pagesync_store::Record;

/// Number of the first remote page.
pub const INITIAL_PAGE: u32 = 1;

/// Why a load was triggered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LoadType {
    /// Full reload; replaces everything cached.
    Refresh,
    /// Growth at the start of the sequence.
    Prepend,
    /// Growth at the end of the sequence.
    Append,
}

impl std::fmt::Display for LoadType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            LoadType::Refresh => "refresh",
            LoadType::Prepend => "prepend",
            LoadType::Append => "append",
        };
        f.write_str(name)
    }
}

/// Direction a consumer can grow the sequence in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    /// Towards earlier pages.
    Prepend,
    /// Towards later pages.
    Append,
}

impl Direction {
    /// Returns the load type that grows the sequence this way.
    #[must_use]
    pub const fn load_type(self) -> LoadType {
        match self {
            Direction::Prepend => LoadType::Prepend,
            Direction::Append => LoadType::Append,
        }
    }
}

/// Describes a mediator load.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    /// Why the load was triggered.
    pub load_type: LoadType,
    /// Consumer's last viewed position in the flattened sequence.
    pub anchor_position: Option<usize>,
}

impl PageRequest {
    /// Creates a request.
    #[must_use]
    pub const fn new(load_type: LoadType, anchor_position: Option<usize>) -> Self {
        Self {
            load_type,
            anchor_position,
        }
    }

    /// A REFRESH anchored at `anchor_position`.
    #[must_use]
    pub const fn refresh(anchor_position: Option<usize>) -> Self {
        Self::new(LoadType::Refresh, anchor_position)
    }

    /// An APPEND.
    #[must_use]
    pub const fn append() -> Self {
        Self::new(LoadType::Append, None)
    }

    /// A PREPEND.
    #[must_use]
    pub const fn prepend() -> Self {
        Self::new(LoadType::Prepend, None)
    }
}

/// Records returned by one remote fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchResult {
    /// Records in remote order.
    pub records: Vec<Record>,
    /// True when the remote had nothing left in this direction.
    pub end_of_pagination: bool,
}

impl FetchResult {
    /// Wraps fetched records; an empty page marks the end of pagination.
    #[must_use]
    pub fn from_records(records: Vec<Record>) -> Self {
        let end_of_pagination = records.is_empty();
        Self {
            records,
            end_of_pagination,
        }
    }
}

/// Outcome of a successful mediator load.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MediatorResult {
    /// No further data exists in the requested direction.
    pub end_of_pagination: bool,
    /// Remote page that was fetched and committed, if any.
    pub fetched_page: Option<u32>,
    /// Number of records committed.
    pub records: usize,
}

impl MediatorResult {
    /// A result for a load that made no remote call.
    #[must_use]
    pub const fn without_fetch(end_of_pagination: bool) -> Self {
        Self {
            end_of_pagination,
            fetched_page: None,
            records: 0,
        }
    }
}

/// A loaded page of items with the keys of its neighbours.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page<K, T> {
    /// Items in order.
    pub data: Vec<T>,
    /// Key that loads the page before this one.
    pub prev_key: Option<K>,
    /// Key that loads the page after this one.
    pub next_key: Option<K>,
}

impl<K, T> Page<K, T> {
    /// Creates a page.
    pub fn new(data: Vec<T>, prev_key: Option<K>, next_key: Option<K>) -> Self {
        Self {
            data,
            prev_key,
            next_key,
        }
    }

    /// Returns true if the page holds no items.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Returns the number of items.
    pub fn len(&self) -> usize {
        self.data.len()
    }
}

/// The loaded pages plus the consumer's anchor, as seen at one instant.
#[derive(Debug)]
pub struct PagingState<'a, K, T> {
    /// Loaded pages in sequence order.
    pub pages: &'a [Page<K, T>],
    /// Consumer's last viewed position in the flattened pages.
    pub anchor_position: Option<usize>,
}

impl<K, T> Clone for PagingState<'_, K, T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<K, T> Copy for PagingState<'_, K, T> {}

impl<'a, K, T> PagingState<'a, K, T> {
    /// Creates a view over `pages`.
    pub fn new(pages: &'a [Page<K, T>], anchor_position: Option<usize>) -> Self {
        Self {
            pages,
            anchor_position,
        }
    }

    /// Returns true if no page holds an item.
    pub fn is_empty(&self) -> bool {
        self.pages.iter().all(Page::is_empty)
    }

    /// Returns the page containing `position`.
    ///
    /// Positions past either end resolve to the first or last page.
    pub fn closest_page_to_position(&self, position: usize) -> Option<&'a Page<K, T>> {
        if self.is_empty() {
            return None;
        }

        let last = self.pages.len() - 1;
        let mut index = 0;
        let mut remaining = position;
        while index < last && remaining >= self.pages[index].len() {
            remaining -= self.pages[index].len();
            index += 1;
        }
        self.pages.get(index)
    }

    /// Returns the item at `position`, clamped to the last loaded item.
    pub fn closest_item_to_position(&self, position: usize) -> Option<&'a T> {
        let total: usize = self.pages.iter().map(Page::len).sum();
        if total == 0 {
            return None;
        }
        self.pages
            .iter()
            .flat_map(|page| page.data.iter())
            .nth(position.min(total - 1))
    }

    /// Returns the first item of the first non-empty page.
    pub fn first_item(&self) -> Option<&'a T> {
        let page = self.pages.iter().find(|page| !page.is_empty())?;
        page.data.first()
    }

    /// Returns the last item of the last non-empty page.
    pub fn last_item(&self) -> Option<&'a T> {
        let page = self.pages.iter().rev().find(|page| !page.is_empty())?;
        page.data.last()
    }
}
