//! Backend abstraction for the remote store.

use crate::error::{SyncError, SyncResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use soulsync_protocol::{
    rank_for_score, CloudSaveRow, LeaderboardQuery, LeaderboardRow, NewScore, PlayerProfile,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use uuid::Uuid;

/// An authenticated anonymous identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    /// Account id.
    pub user_id: Uuid,
    /// Bearer token for authenticated requests.
    pub access_token: String,
    /// Token used to restore the session later.
    pub refresh_token: Option<String>,
    /// When the access token expires.
    pub expires_at: Option<DateTime<Utc>>,
}

/// The remote store behind the sync service.
///
/// This trait abstracts the network layer, allowing for different
/// implementations (REST, in-memory for testing, etc.). Single-row loads
/// return `Ok(None)` when no row exists; that is not an error.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Creates a new anonymous identity.
    async fn sign_in_anonymously(&self) -> SyncResult<Session>;

    /// Exchanges a stored session for a fresh one.
    async fn restore_session(&self, session: &Session) -> SyncResult<Session>;

    /// Ends a session server-side.
    async fn sign_out(&self, session: &Session) -> SyncResult<()>;

    /// Inserts a score and returns the stored row.
    async fn insert_score(&self, session: Option<&Session>, score: &NewScore)
        -> SyncResult<LeaderboardRow>;

    /// Reads leaderboard rows, highest score first.
    async fn query_leaderboard(&self, query: &LeaderboardQuery) -> SyncResult<Vec<LeaderboardRow>>;

    /// Counts rows with a score strictly greater than `score`.
    async fn count_scores_above(&self, score: u64) -> SyncResult<u64>;

    /// Loads the account's cloud save.
    async fn fetch_cloud_save(&self, session: &Session) -> SyncResult<Option<CloudSaveRow>>;

    /// Inserts or replaces the account's cloud save.
    async fn upsert_cloud_save(&self, session: &Session, row: &CloudSaveRow) -> SyncResult<()>;

    /// Deletes the account's cloud save.
    async fn delete_cloud_save(&self, session: &Session) -> SyncResult<()>;

    /// Loads the account's profile.
    async fn fetch_profile(&self, session: &Session) -> SyncResult<Option<PlayerProfile>>;

    /// Inserts or replaces the account's profile.
    async fn upsert_profile(&self, session: &Session, profile: &PlayerProfile) -> SyncResult<()>;
}

/// Which backend calls a [`MemoryBackend`] should fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    /// Anonymous sign-in and session restore.
    Auth,
    /// Score inserts.
    InsertScore,
    /// Leaderboard reads and rank counts.
    ReadLeaderboard,
    /// Cloud save loads.
    FetchSave,
    /// Cloud save upserts and deletes.
    WriteSave,
    /// Profile loads and upserts.
    Profile,
}

#[derive(Default)]
struct MemoryState {
    leaderboard: Vec<LeaderboardRow>,
    saves: HashMap<Uuid, CloudSaveRow>,
    profiles: HashMap<Uuid, PlayerProfile>,
    sessions: HashMap<String, Uuid>,
    next_id: i64,
    failures: HashMap<Operation, u32>,
    calls: HashMap<Operation, u32>,
    save_writes: Vec<CloudSaveRow>,
}

/// An in-memory backend for testing.
///
/// Failures can be injected per operation; each injected failure is consumed
/// by one call.
pub struct MemoryBackend {
    state: Mutex<MemoryState>,
    online: AtomicBool,
    sessions_issued: AtomicU32,
}

impl MemoryBackend {
    /// Creates an empty, online backend.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MemoryState::default()),
            online: AtomicBool::new(true),
            sessions_issued: AtomicU32::new(0),
        }
    }

    /// Sets the online state. Offline, every call fails with a retryable
    /// transport error.
    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
    }

    /// Makes the next `count` calls of `operation` fail.
    pub fn fail_next(&self, operation: Operation, count: u32) {
        *self.state.lock().failures.entry(operation).or_insert(0) += count;
    }

    /// Makes every call of `operation` fail until cleared.
    pub fn fail_always(&self, operation: Operation) {
        self.state.lock().failures.insert(operation, u32::MAX);
    }

    /// Clears injected failures.
    pub fn clear_failures(&self) {
        self.state.lock().failures.clear();
    }

    /// Number of calls made for `operation`.
    pub fn calls(&self, operation: Operation) -> u32 {
        self.state.lock().calls.get(&operation).copied().unwrap_or(0)
    }

    /// Number of sessions issued by sign-in or restore.
    pub fn sessions_issued(&self) -> u32 {
        self.sessions_issued.load(Ordering::SeqCst)
    }

    /// Adds a leaderboard row as if another player had submitted it.
    pub fn seed_score(&self, row: LeaderboardRow) {
        let mut state = self.state.lock();
        state.next_id = state.next_id.max(row.id);
        state.leaderboard.push(row);
    }

    /// Stores a cloud save row directly.
    pub fn seed_save(&self, row: CloudSaveRow) {
        self.state.lock().saves.insert(row.user_id, row);
    }

    /// Returns the stored cloud save for `user_id`.
    pub fn stored_save(&self, user_id: Uuid) -> Option<CloudSaveRow> {
        self.state.lock().saves.get(&user_id).cloned()
    }

    /// Returns every successful cloud save write, oldest first.
    pub fn save_writes(&self) -> Vec<CloudSaveRow> {
        self.state.lock().save_writes.clone()
    }

    /// Returns the stored profile for `user_id`.
    pub fn stored_profile(&self, user_id: Uuid) -> Option<PlayerProfile> {
        self.state.lock().profiles.get(&user_id).cloned()
    }

    fn begin(&self, operation: Operation) -> SyncResult<()> {
        let mut state = self.state.lock();
        *state.calls.entry(operation).or_insert(0) += 1;

        if !self.online.load(Ordering::SeqCst) {
            return Err(SyncError::transport_retryable("backend offline"));
        }

        if let Some(remaining) = state.failures.get_mut(&operation) {
            if *remaining > 0 {
                if *remaining != u32::MAX {
                    *remaining -= 1;
                }
                return Err(SyncError::Backend {
                    status: 503,
                    message: format!("injected {operation:?} failure"),
                });
            }
        }
        Ok(())
    }

    fn authorize(&self, session: &Session) -> SyncResult<Uuid> {
        self.state
            .lock()
            .sessions
            .get(&session.access_token)
            .copied()
            .ok_or_else(|| SyncError::AuthenticationFailed("unknown access token".into()))
    }

    fn issue(&self, user_id: Uuid) -> Session {
        let n = self.sessions_issued.fetch_add(1, Ordering::SeqCst) + 1;
        let session = Session {
            user_id,
            access_token: format!("access-{user_id}-{n}"),
            refresh_token: Some(format!("refresh-{user_id}-{n}")),
            expires_at: Some(Utc::now() + chrono::Duration::hours(1)),
        };
        self.state
            .lock()
            .sessions
            .insert(session.access_token.clone(), user_id);
        session
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Backend for MemoryBackend {
    async fn sign_in_anonymously(&self) -> SyncResult<Session> {
        self.begin(Operation::Auth)?;
        Ok(self.issue(Uuid::new_v4()))
    }

    async fn restore_session(&self, session: &Session) -> SyncResult<Session> {
        self.begin(Operation::Auth)?;
        let prefix = format!("refresh-{}-", session.user_id);
        let known = session
            .refresh_token
            .as_deref()
            .is_some_and(|token| token.starts_with(&prefix));
        if !known {
            return Err(SyncError::AuthenticationFailed("invalid refresh token".into()));
        }
        Ok(self.issue(session.user_id))
    }

    async fn sign_out(&self, session: &Session) -> SyncResult<()> {
        self.state.lock().sessions.remove(&session.access_token);
        Ok(())
    }

    async fn insert_score(
        &self,
        session: Option<&Session>,
        score: &NewScore,
    ) -> SyncResult<LeaderboardRow> {
        self.begin(Operation::InsertScore)?;
        let mut state = self.state.lock();
        state.next_id += 1;
        let row = LeaderboardRow {
            id: state.next_id,
            player_name: score.player_name.clone(),
            score: score.score,
            weapon_used: score.weapon_used.clone(),
            monsters_sliced: score.monsters_sliced,
            max_combo: score.max_combo,
            time_elapsed_seconds: score.time_elapsed_seconds,
            created_at: Utc::now(),
            user_id: score.user_id.or(session.map(|s| s.user_id)),
        };
        state.leaderboard.push(row.clone());
        Ok(row)
    }

    async fn query_leaderboard(&self, query: &LeaderboardQuery) -> SyncResult<Vec<LeaderboardRow>> {
        self.begin(Operation::ReadLeaderboard)?;
        let state = self.state.lock();
        let mut rows: Vec<LeaderboardRow> = state
            .leaderboard
            .iter()
            .filter(|row| query.matches(row))
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.score.cmp(&a.score));
        rows.truncate(query.limit);
        Ok(rows)
    }

    async fn count_scores_above(&self, score: u64) -> SyncResult<u64> {
        self.begin(Operation::ReadLeaderboard)?;
        let state = self.state.lock();
        Ok(rank_for_score(state.leaderboard.iter().map(|row| row.score), score) - 1)
    }

    async fn fetch_cloud_save(&self, session: &Session) -> SyncResult<Option<CloudSaveRow>> {
        self.begin(Operation::FetchSave)?;
        let user_id = self.authorize(session)?;
        Ok(self.state.lock().saves.get(&user_id).cloned())
    }

    async fn upsert_cloud_save(&self, session: &Session, row: &CloudSaveRow) -> SyncResult<()> {
        self.begin(Operation::WriteSave)?;
        let user_id = self.authorize(session)?;
        if row.user_id != user_id {
            return Err(SyncError::Backend {
                status: 403,
                message: "row belongs to another account".into(),
            });
        }
        let mut state = self.state.lock();
        state.saves.insert(user_id, row.clone());
        state.save_writes.push(row.clone());
        Ok(())
    }

    async fn delete_cloud_save(&self, session: &Session) -> SyncResult<()> {
        self.begin(Operation::WriteSave)?;
        let user_id = self.authorize(session)?;
        self.state.lock().saves.remove(&user_id);
        Ok(())
    }

    async fn fetch_profile(&self, session: &Session) -> SyncResult<Option<PlayerProfile>> {
        self.begin(Operation::Profile)?;
        let user_id = self.authorize(session)?;
        Ok(self.state.lock().profiles.get(&user_id).cloned())
    }

    async fn upsert_profile(&self, session: &Session, profile: &PlayerProfile) -> SyncResult<()> {
        self.begin(Operation::Profile)?;
        let user_id = self.authorize(session)?;
        self.state.lock().profiles.insert(user_id, profile.clone());
        Ok(())
    }
}
