//! # SoulSync Protocol
//!
//! Save snapshot model and conflict rules for SoulSync.
//!
//! This crate provides:
//! - `SaveSnapshot`, the serializable player progress record
//! - `fingerprint` / `Checksum` for integrity checks on save blobs
//! - `merge`, the lossless merge-max policy for concurrent saves
//! - Leaderboard rows, time filters and client-side ranking
//! - Row types for the `cloud_saves` and `player_profiles` relations
//!
//! This is a pure data crate with no I/O operations.
//!
//! ## Merge Invariants
//!
//! - No numeric field of a merge result is smaller than in either input
//! - No set member or map key present in either input is dropped
//! - `merge(x, x)` has the same progress as `x`

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod checksum;
mod error;
mod leaderboard;
mod merge;
mod records;
mod snapshot;

pub use checksum::{fingerprint, Checksum};
pub use error::{ProtocolError, ProtocolResult};
pub use leaderboard::{
    assign_ranks, rank_for_score, LeaderboardEntry, LeaderboardQuery, LeaderboardRow, NewScore,
    TimeFilter,
};
pub use merge::{merge, merge_at};
pub use records::{CloudSaveRow, PlayerProfile};
pub use snapshot::SaveSnapshot;
