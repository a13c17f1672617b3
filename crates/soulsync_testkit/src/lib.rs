//! # SoulSync Testkit
//!
//! Test utilities for SoulSync.
//!
//! This crate provides:
//! - Snapshot and leaderboard fixtures
//! - Property-based test generators using proptest
//!
//! ## Usage
//!
//! ```rust,ignore
//! use soulsync_testkit::prelude::*;
//!
//! proptest! {
//!     #[test]
//!     fn merge_keeps_souls(a in snapshot_strategy(), b in snapshot_strategy()) {
//!         // ...
//!     }
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::generators::*;
}

pub use fixtures::*;
pub use generators::*;
