//! Error types for the local store.

use thiserror::Error;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors raised by the local store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The journal backend failed.
    #[error("storage error: {0}")]
    Storage(#[from] pagesync_storage::StorageError),

    /// A journal entry could not be encoded or decoded.
    #[error("codec error: {0}")]
    Codec(String),

    /// A complete journal frame failed validation.
    #[error("journal corruption at offset {offset}: {message}")]
    JournalCorruption {
        /// Offset of the bad frame.
        offset: u64,
        /// Description of the corruption.
        message: String,
    },

    /// The transaction body asked for the transaction to be abandoned.
    #[error("transaction aborted: {reason}")]
    TransactionAborted {
        /// Reason for abort.
        reason: String,
    },
}

impl StoreError {
    /// Creates a codec error.
    pub fn codec(message: impl Into<String>) -> Self {
        Self::Codec(message.into())
    }

    /// Creates a journal corruption error.
    pub fn corruption(offset: u64, message: impl Into<String>) -> Self {
        Self::JournalCorruption {
            offset,
            message: message.into(),
        }
    }

    /// Creates an aborted-transaction error.
    pub fn aborted(reason: impl Into<String>) -> Self {
        Self::TransactionAborted {
            reason: reason.into(),
        }
    }

    /// Returns true if the failure came from the storage layer and retrying
    /// the same commit may succeed.
    #[must_use]
    pub fn is_io(&self) -> bool {
        matches!(self, Self::Storage(_))
    }
}
