//! # SoulSync Engine
//!
//! Client-side cloud sync for SoulSync saves, scores and profiles.
//!
//! This crate provides:
//! - `SyncService`, the single entry point owning session, caches and the
//!   pending save
//! - TTL caches for leaderboard pages and personal bests
//! - Debounced save writes with bounded exponential-backoff retry
//! - Merge-on-sync of local and cloud saves with checksum verification
//! - `Backend` abstraction with a REST implementation and an in-memory one
//!   for tests
//! - Session persistence across restarts
//!
//! ## Failure Model
//!
//! Nothing here is fatal to the game. Every public `SyncService` operation
//! has a safe failure value:
//!
//! - Writes (score submission, save and profile upserts) are retried, then
//!   report `false` or `None`
//! - Reads fail soft immediately to an empty or absent result
//! - A missing row is an expected `None`, not an error
//! - A checksum mismatch is logged and the data is still returned
//! - Without credentials the service reports unavailable and does nothing

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod backend;
mod cache;
mod config;
mod debounce;
mod error;
mod http;
mod retry;
mod service;
mod session;

pub use backend::{Backend, MemoryBackend, Operation, Session};
pub use cache::{CacheEntry, TtlCache};
pub use config::{RetryConfig, SyncConfig, ENV_API_KEY, ENV_SESSION_PATH, ENV_URL};
pub use debounce::SaveDebouncer;
pub use error::{SyncError, SyncResult};
pub use http::RestBackend;
pub use retry::RetryExecutor;
pub use service::{SaveSyncResult, SyncAction, SyncService, SyncStats};
pub use session::{FileSessionStore, MemorySessionStore, SessionStore};
