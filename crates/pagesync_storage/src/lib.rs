//! # pagesync storage
//!
//! Byte-store backends underneath the pagesync cache journal.
//!
//! A backend is an append-only byte log. It never interprets what it holds:
//! framing, checksums and replay belong to `pagesync_store`.
//!
//! ## Available Backends
//!
//! - [`InMemoryBackend`] - ephemeral caches and tests
//! - [`FileBackend`] - a single locked file that survives restarts
//!
//! ## Example
//!
//! ```rust
//! use pagesync_storage::{InMemoryBackend, StorageBackend};
//!
//! let mut journal = InMemoryBackend::new();
//! let first = journal.append(b"frame-1").unwrap();
//! let second = journal.append(b"frame-2").unwrap();
//! assert_eq!(first, 0);
//! assert_eq!(second, 7);
//! assert_eq!(journal.read_all().unwrap(), b"frame-1frame-2");
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod backend;
mod error;
mod file;
mod memory;

pub use backend::StorageBackend;
pub use error::{StorageError, StorageResult};
pub use file::FileBackend;
pub use memory::InMemoryBackend;
