//! Error types for the paging engine.

use pagesync_store::StoreError;
use std::time::Duration;
use thiserror::Error;

/// Result type for paging operations.
pub type PagingResult<T> = Result<T, PagingError>;

/// A remote page fetch failed or timed out.
///
/// Always retryable by re-issuing the same logical request.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("transient fetch error: {message}")]
pub struct TransientFetchError {
    message: String,
    timed_out: bool,
}

impl TransientFetchError {
    /// Creates a fetch error with a human-readable cause.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            timed_out: false,
        }
    }

    /// Creates the error reported when a fetch exceeds `timeout`.
    pub fn timed_out(timeout: Duration) -> Self {
        Self {
            message: format!("fetch timed out after {timeout:?}"),
            timed_out: true,
        }
    }

    /// Returns the cause, suitable for display.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Returns true if the fetch was cut off by the timeout.
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        self.timed_out
    }
}

/// Errors that can occur while paging.
#[derive(Error, Debug)]
pub enum PagingError {
    /// The remote fetch failed.
    #[error(transparent)]
    Fetch(#[from] TransientFetchError),

    /// The local store rejected a read or commit.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// The configuration cannot drive a session.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// A refresh replaced the session while this load was pending.
    #[error("load superseded by refresh")]
    Superseded,

    /// The background commit task did not finish.
    #[error("background task failed: {0}")]
    Task(String),
}

impl PagingError {
    /// Creates an invalid configuration error.
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig(message.into())
    }

    /// Returns true if re-issuing the same request may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            PagingError::Fetch(_) => true,
            PagingError::Store(e) => e.is_io(),
            PagingError::InvalidConfig(_) | PagingError::Superseded | PagingError::Task(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_errors() {
        let offline = PagingError::from(TransientFetchError::new("Bad internet connection"));
        assert!(offline.is_retryable());
        let timeout = PagingError::from(TransientFetchError::timed_out(Duration::from_secs(1)));
        assert!(timeout.is_retryable());
        assert!(!PagingError::Superseded.is_retryable());
        assert!(!PagingError::invalid_config("page_size").is_retryable());
        assert!(!PagingError::Store(StoreError::aborted("fault")).is_retryable());
    }

    #[test]
    fn fetch_error_display_is_transparent() {
        let err = PagingError::from(TransientFetchError::new("Bad internet connection"));
        assert_eq!(
            err.to_string(),
            "transient fetch error: Bad internet connection"
        );
    }

    #[test]
    fn timeout_is_flagged() {
        let err = TransientFetchError::timed_out(Duration::from_millis(5));
        assert!(err.is_timeout());
        assert!(err.message().contains("5ms"));
        assert!(!TransientFetchError::new("x").is_timeout());
    }
}
