//! Load states and the snapshots handed to consumers.

use crate::model::LoadType;
use pagesync_store::Record;
use std::sync::Arc;

/// State of loading in one direction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadState {
    /// No load is running.
    Idle {
        /// No more data exists in this direction until the next refresh.
        end_of_pagination: bool,
    },
    /// A load is in flight.
    Loading,
    /// The last load failed; retrying re-issues it.
    Error {
        /// Human-readable cause.
        message: String,
    },
}

impl LoadState {
    /// Idle with more data possibly available.
    pub const NOT_LOADING: Self = Self::Idle {
        end_of_pagination: false,
    };

    /// Idle at the end of the data.
    pub const COMPLETE: Self = Self::Idle {
        end_of_pagination: true,
    };

    /// Creates an idle state.
    #[must_use]
    pub const fn idle(end_of_pagination: bool) -> Self {
        Self::Idle { end_of_pagination }
    }

    /// Creates an error state.
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }

    /// Returns true while a load is in flight.
    #[must_use]
    pub fn is_loading(&self) -> bool {
        matches!(self, Self::Loading)
    }

    /// Returns true if the last load failed.
    #[must_use]
    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error { .. })
    }

    /// Returns true if this direction is exhausted.
    #[must_use]
    pub fn end_of_pagination(&self) -> bool {
        matches!(
            self,
            Self::Idle {
                end_of_pagination: true
            }
        )
    }

    /// Returns the failure message, if any.
    #[must_use]
    pub fn error_message(&self) -> Option<&str> {
        match self {
            Self::Error { message } => Some(message),
            _ => None,
        }
    }
}

impl Default for LoadState {
    fn default() -> Self {
        Self::NOT_LOADING
    }
}

/// Load state of each direction.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadStates {
    /// Full reload.
    pub refresh: LoadState,
    /// Growth at the start.
    pub prepend: LoadState,
    /// Growth at the end.
    pub append: LoadState,
}

impl LoadStates {
    /// Returns the state for `load_type`.
    #[must_use]
    pub fn get(&self, load_type: LoadType) -> &LoadState {
        match load_type {
            LoadType::Refresh => &self.refresh,
            LoadType::Prepend => &self.prepend,
            LoadType::Append => &self.append,
        }
    }

    /// Replaces the state for `load_type`.
    pub fn set(&mut self, load_type: LoadType, state: LoadState) {
        match load_type {
            LoadType::Refresh => self.refresh = state,
            LoadType::Prepend => self.prepend = state,
            LoadType::Append => self.append = state,
        }
    }

    /// Returns the load types whose last load failed, refresh first.
    #[must_use]
    pub fn failed(&self) -> Vec<LoadType> {
        [LoadType::Refresh, LoadType::Prepend, LoadType::Append]
            .into_iter()
            .filter(|load_type| self.get(*load_type).is_error())
            .collect()
    }

    /// Returns true if any direction is loading.
    #[must_use]
    pub fn is_loading(&self) -> bool {
        self.refresh.is_loading() || self.prepend.is_loading() || self.append.is_loading()
    }
}

/// An immutable view of the presented sequence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PagingSnapshot {
    /// Bumped each time the sequence is discarded and rebuilt by a refresh.
    pub generation: u64,
    /// Items in presentation order.
    pub items: Arc<[Record]>,
    /// Load state of each direction.
    pub load_states: LoadStates,
}

impl PagingSnapshot {
    /// An empty snapshot of generation 0.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            generation: 0,
            items: Arc::from(Vec::new()),
            load_states: LoadStates::default(),
        }
    }

    /// Returns the number of items.
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Returns true if no item is presented.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Returns the item at `position`.
    #[must_use]
    pub fn get(&self, position: usize) -> Option<&Record> {
        self.items.get(position)
    }

    /// Returns the item keys in order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.items.iter().map(|record| record.key.as_str())
    }
}
