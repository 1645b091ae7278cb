//! # pagesync testkit
//!
//! Test utilities for pagesync.
//!
//! This crate provides:
//! - A crash-injecting journal backend and a harness built on it
//! - Store and session fixtures with automatic cleanup
//! - Cache consistency checks
//! - Property-based test generators using proptest
//!
//! ## Usage
//!
//! ```rust
//! use pagesync_testkit::prelude::*;
//!
//! let store = TestStore::memory();
//! assert!(cursor_violations(&store).is_empty());
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod crash;
pub mod fixtures;
pub mod generators;
pub mod invariants;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::crash::*;
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::invariants::*;
}

pub use crash::*;
pub use fixtures::*;
pub use generators::*;
pub use invariants::*;
