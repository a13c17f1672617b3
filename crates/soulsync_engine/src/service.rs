//! The sync service: session, leaderboard, save and profile operations.

use crate::backend::{Backend, Session};
use crate::cache::TtlCache;
use crate::config::SyncConfig;
use crate::debounce::SaveDebouncer;
use crate::error::{SyncError, SyncResult};
use crate::http::RestBackend;
use crate::retry::RetryExecutor;
use crate::session::{FileSessionStore, MemorySessionStore, SessionStore};
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use soulsync_protocol::{
    assign_ranks, merge, CloudSaveRow, LeaderboardEntry, LeaderboardQuery, LeaderboardRow,
    NewScore, PlayerProfile, SaveSnapshot, TimeFilter,
};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Statistics about service operations.
#[derive(Debug, Clone, Default)]
pub struct SyncStats {
    /// Reads answered from a cache.
    pub cache_hits: u64,
    /// Reads that went to the backend.
    pub cache_misses: u64,
    /// Reads that failed soft.
    pub read_failures: u64,
    /// Writes started (each retry sequence counts once).
    pub writes_attempted: u64,
    /// Writes that failed after exhausting retries.
    pub writes_failed: u64,
    /// Total number of retries.
    pub retries: u64,
    /// Loaded saves whose checksum did not match.
    pub integrity_mismatches: u64,
    /// Last completed `sync_save`.
    pub last_sync_time: Option<DateTime<Utc>>,
    /// Last error message.
    pub last_error: Option<String>,
}

/// What `sync_save` did with the local snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncAction {
    /// No remote save existed; the local snapshot was uploaded unchanged.
    UploadedLocal,
    /// Local and remote were merged and the result uploaded.
    Merged,
    /// The remote save could not be read; local stays authoritative.
    LocalOnly,
}

/// Result of a `sync_save` call.
#[derive(Debug, Clone)]
pub struct SaveSyncResult {
    /// The new authoritative local state.
    pub snapshot: SaveSnapshot,
    /// What happened.
    pub action: SyncAction,
    /// Whether the snapshot reached the backend.
    pub uploaded: bool,
}

impl SaveSyncResult {
    fn local_only(snapshot: SaveSnapshot) -> Self {
        Self {
            snapshot,
            action: SyncAction::LocalOnly,
            uploaded: false,
        }
    }
}

/// The retried write path, shared with debounced writes that outlive a call.
#[derive(Clone)]
struct Writer {
    backend: Arc<dyn Backend>,
    retry: RetryExecutor,
    stats: Arc<Mutex<SyncStats>>,
}

impl Writer {
    async fn write<T, F, Fut>(&self, label: &'static str, operation: F) -> SyncResult<T>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = SyncResult<T>>,
    {
        self.stats.lock().writes_attempted += 1;
        let result = self.retry.run(label, operation).await;
        if let Err(e) = &result {
            let mut stats = self.stats.lock();
            stats.writes_failed += 1;
            stats.last_error = Some(format!("{}: {}", label, e));
        }
        result
    }

    async fn upload_save(&self, session: &Session, snapshot: SaveSnapshot) -> SyncResult<()> {
        let row = CloudSaveRow::new(session.user_id, snapshot, Utc::now())?;
        let backend = &*self.backend;
        self.write("upsert_cloud_save", || backend.upsert_cloud_save(session, &row))
            .await?;
        debug!(
            version = row.save_version,
            checksum = %row.save_checksum,
            "cloud save written"
        );
        Ok(())
    }
}

/// Client-side cloud sync for one player.
///
/// The service owns the session handle, both read caches and the pending
/// debounced save. Share it behind an `Arc`; every public operation returns
/// a safe failure value (`None`, an empty list, `false` or `-1`) instead of
/// an error, so a missing or degraded backend never reaches the caller.
pub struct SyncService {
    config: SyncConfig,
    writer: Option<Writer>,
    sessions: Arc<dyn SessionStore>,
    session: RwLock<Option<Session>>,
    /// Held while a sign-in talks to the backend.
    sign_in: tokio::sync::Mutex<()>,
    /// Bumped by every sign-out; a sign-in started under an older value is
    /// discarded.
    generation: AtomicU64,
    leaderboard_cache: Mutex<TtlCache<(usize, TimeFilter), Vec<LeaderboardEntry>>>,
    personal_bests_cache: Mutex<TtlCache<usize, Vec<LeaderboardEntry>>>,
    retry: RetryExecutor,
    debouncer: SaveDebouncer,
    stats: Arc<Mutex<SyncStats>>,
}

impl SyncService {
    /// Creates a service over `backend`, persisting the session in `sessions`.
    pub fn new(
        config: SyncConfig,
        backend: Arc<dyn Backend>,
        sessions: Arc<dyn SessionStore>,
    ) -> Self {
        Self::build(config, Some(backend), sessions)
    }

    /// Creates a service without a backend. It reports unavailable and every
    /// operation fails soft.
    pub fn unavailable(config: SyncConfig) -> Self {
        Self::build(config, None, Arc::new(MemorySessionStore::new()))
    }

    /// Creates a REST-backed service from configuration.
    ///
    /// Missing credentials, or a client that cannot be built, yield an
    /// unavailable service rather than an error.
    pub fn from_config(config: SyncConfig) -> Self {
        let backend = match config.credentials() {
            Some((url, key)) => match RestBackend::new(url, key, config.request_timeout) {
                Ok(backend) => Some(Arc::new(backend) as Arc<dyn Backend>),
                Err(e) => {
                    warn!(error = %e, "cloud backend unavailable");
                    None
                }
            },
            None => {
                info!("cloud credentials not configured, running offline");
                None
            }
        };

        let sessions: Arc<dyn SessionStore> = match &config.session_path {
            Some(path) => Arc::new(FileSessionStore::new(path)),
            None => Arc::new(MemorySessionStore::new()),
        };

        Self::build(config, backend, sessions)
    }

    fn build(
        config: SyncConfig,
        backend: Option<Arc<dyn Backend>>,
        sessions: Arc<dyn SessionStore>,
    ) -> Self {
        let retry = RetryExecutor::new(config.retry);
        let stats = Arc::new(Mutex::new(SyncStats::default()));
        let writer = backend.map(|backend| Writer {
            backend,
            retry: retry.clone(),
            stats: Arc::clone(&stats),
        });

        Self {
            debouncer: SaveDebouncer::new(config.save_debounce),
            config,
            writer,
            sessions,
            session: RwLock::new(None),
            sign_in: tokio::sync::Mutex::new(()),
            generation: AtomicU64::new(0),
            leaderboard_cache: Mutex::new(TtlCache::new()),
            personal_bests_cache: Mutex::new(TtlCache::new()),
            retry,
            stats,
        }
    }

    /// Returns the configuration.
    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Returns true if a backend is configured.
    pub fn is_available(&self) -> bool {
        self.writer.is_some()
    }

    /// Returns the active session, if any.
    pub fn session(&self) -> Option<Session> {
        self.session.read().clone()
    }

    /// Returns true if a session is active.
    pub fn is_signed_in(&self) -> bool {
        self.session.read().is_some()
    }

    /// Gets the current stats.
    pub fn stats(&self) -> SyncStats {
        let mut stats = self.stats.lock().clone();
        stats.retries = self.retry.retries_performed();
        stats
    }

    fn backend(&self) -> Option<&dyn Backend> {
        self.writer.as_ref().map(|w| &*w.backend)
    }

    fn signed_in(&self, operation: &str) -> Option<(&Writer, Session)> {
        let ready = match (self.writer.as_ref(), self.session()) {
            (None, _) => Err(SyncError::NotConfigured),
            (Some(_), None) => Err(SyncError::NotSignedIn),
            (Some(writer), Some(session)) => Ok((writer, session)),
        };
        ready
            .map_err(|reason| debug!(operation, %reason, "skipped"))
            .ok()
    }

    fn read_failed(&self, operation: &str, err: &SyncError) {
        warn!(operation, error = %err, retryable = err.is_retryable(), "read failed soft");
        let mut stats = self.stats.lock();
        stats.read_failures += 1;
        stats.last_error = Some(format!("{}: {}", operation, err));
    }

    fn count_cache(&self, hit: bool) {
        let mut stats = self.stats.lock();
        if hit {
            stats.cache_hits += 1;
        } else {
            stats.cache_misses += 1;
        }
    }

    // ========================================================================
    // Session
    // ========================================================================

    /// Signs in anonymously.
    ///
    /// Returns the active session if there is one. Otherwise the stored
    /// session is restored, or a fresh identity is created if that fails.
    /// Concurrent callers share a single sign-in, and a `sign_out` that
    /// lands while it is in flight wins.
    pub async fn sign_in_anonymously(&self) -> Option<Session> {
        let backend = self.backend()?;
        if let Some(session) = self.session() {
            return Some(session);
        }

        let _in_flight = self.sign_in.lock().await;
        if let Some(session) = self.session() {
            return Some(session);
        }

        let generation = self.generation.load(Ordering::SeqCst);
        let session = match self.establish_session(backend).await {
            Ok(session) => session,
            Err(e) => {
                warn!(error = %e, "anonymous sign-in failed");
                self.stats.lock().last_error = Some(format!("sign_in: {}", e));
                return None;
            }
        };

        if !self.install_session(&session, generation) {
            debug!(user_id = %session.user_id, "signed out during sign-in, discarding session");
            if let Err(e) = backend.sign_out(&session).await {
                warn!(error = %e, "server-side sign-out failed");
            }
            return None;
        }
        info!(user_id = %session.user_id, "signed in");
        Some(session)
    }

    async fn establish_session(&self, backend: &dyn Backend) -> SyncResult<Session> {
        let stored = self.sessions.load().unwrap_or_else(|e| {
            warn!(error = %e, "stored session unreadable, ignoring it");
            None
        });

        if let Some(stored) = stored {
            match backend.restore_session(&stored).await {
                Ok(session) => return Ok(session),
                Err(e) => {
                    warn!(error = %e, "stored session could not be restored, signing in fresh");
                }
            }
        }

        backend.sign_in_anonymously().await
    }

    /// Activates and persists `session` unless a sign-out happened since
    /// `generation` was read.
    fn install_session(&self, session: &Session, generation: u64) -> bool {
        let mut active = self.session.write();
        if self.generation.load(Ordering::SeqCst) != generation {
            return false;
        }
        *active = Some(session.clone());
        self.personal_bests_cache.lock().invalidate_all();
        if let Err(e) = self.sessions.save(session) {
            warn!(error = %e, "failed to persist session");
        }
        true
    }

    /// Signs out: cancels any pending save, ends the session and clears every
    /// cache.
    pub async fn sign_out(&self) {
        self.debouncer.cancel();

        let session = {
            let mut active = self.session.write();
            self.generation.fetch_add(1, Ordering::SeqCst);
            active.take()
        };
        self.leaderboard_cache.lock().invalidate_all();
        self.personal_bests_cache.lock().invalidate_all();

        if let Err(e) = self.sessions.clear() {
            warn!(error = %e, "failed to clear stored session");
        }

        if let (Some(backend), Some(session)) = (self.backend(), session) {
            if let Err(e) = backend.sign_out(&session).await {
                warn!(error = %e, "server-side sign-out failed");
            }
            info!(user_id = %session.user_id, "signed out");
        }
    }

    // ========================================================================
    // Leaderboard
    // ========================================================================

    /// Submits a score. On success the leaderboard and personal-bests caches
    /// are invalidated and the stored row is returned.
    pub async fn submit_score(&self, score: NewScore) -> Option<LeaderboardRow> {
        let writer = self.writer.as_ref()?;
        if let Err(e) = score.validate() {
            warn!(error = %e, "rejected score submission");
            return None;
        }

        let session = self.session();
        let backend = &*writer.backend;
        let result = writer
            .write("insert_score", || {
                backend.insert_score(session.as_ref(), &score)
            })
            .await;

        match result {
            Ok(row) => {
                self.leaderboard_cache.lock().invalidate_all();
                self.personal_bests_cache.lock().invalidate_all();
                info!(id = row.id, score = row.score, "score submitted");
                Some(row)
            }
            Err(_) => None,
        }
    }

    /// Returns the top `limit` scores within `filter`, ranked from 1.
    ///
    /// Results are cached per `(limit, filter)`. Fails soft to an empty list.
    pub async fn get_leaderboard(&self, limit: usize, filter: TimeFilter) -> Vec<LeaderboardEntry> {
        let Some(backend) = self.backend() else {
            return Vec::new();
        };

        let key = (limit, filter);
        let (cached, epoch) = {
            let mut cache = self.leaderboard_cache.lock();
            (cache.get(&key), cache.epoch())
        };
        self.count_cache(cached.is_some());
        if let Some(entries) = cached {
            return entries;
        }

        let query = LeaderboardQuery::top(limit).with_filter(filter, Utc::now());
        match backend.query_leaderboard(&query).await {
            Ok(rows) => {
                let entries = assign_ranks(rows, limit);
                let stored = self.leaderboard_cache.lock().insert_if_current(
                    epoch,
                    key,
                    entries.clone(),
                    self.config.leaderboard_ttl,
                );
                if !stored {
                    debug!(limit, %filter, "leaderboard invalidated during fetch, not caching");
                }
                entries
            }
            Err(e) => {
                self.read_failed("get_leaderboard", &e);
                Vec::new()
            }
        }
    }

    /// Returns the rank `score` would take: scores strictly greater, plus one.
    ///
    /// Fails soft to `-1`.
    pub async fn get_rank_for_score(&self, score: u64) -> i64 {
        let Some(backend) = self.backend() else {
            return -1;
        };
        match backend.count_scores_above(score).await {
            Ok(above) => rank_above(above),
            Err(e) => {
                self.read_failed("get_rank_for_score", &e);
                -1
            }
        }
    }

    /// Returns the signed-in player's own best scores.
    ///
    /// `None` without a session; an empty list if the read fails.
    pub async fn get_personal_bests(&self, limit: usize) -> Option<Vec<LeaderboardEntry>> {
        let (writer, session) = self.signed_in("get_personal_bests")?;

        let (cached, epoch) = {
            let mut cache = self.personal_bests_cache.lock();
            (cache.get(&limit), cache.epoch())
        };
        self.count_cache(cached.is_some());
        if cached.is_some() {
            return cached;
        }

        let query = LeaderboardQuery::top(limit).for_user(session.user_id);
        match writer.backend.query_leaderboard(&query).await {
            Ok(rows) => {
                let entries = assign_ranks(rows, limit);
                self.personal_bests_cache.lock().insert_if_current(
                    epoch,
                    limit,
                    entries.clone(),
                    self.config.personal_bests_ttl,
                );
                Some(entries)
            }
            Err(e) => {
                self.read_failed("get_personal_bests", &e);
                Some(Vec::new())
            }
        }
    }

    // ========================================================================
    // Cloud save
    // ========================================================================

    /// Schedules a debounced, checksummed, retried write of `snapshot`.
    ///
    /// Calls within the debounce window coalesce: only the last snapshot is
    /// written, and every coalesced caller resolves to that write's outcome.
    /// Resolves to `false` without a session, on exhausted retries, or if the
    /// write is cancelled by `delete_cloud_save` or `sign_out`.
    pub async fn save_to_cloud(&self, snapshot: SaveSnapshot) -> bool {
        let Some((writer, session)) = self.signed_in("save_to_cloud") else {
            return false;
        };
        let writer = writer.clone();

        self.debouncer
            .schedule(snapshot, move |snapshot| async move {
                writer.upload_save(&session, snapshot).await.is_ok()
            })
            .await
    }

    /// Loads the cloud save.
    ///
    /// `None` if no save exists yet, without a session, or if the read fails.
    /// A checksum mismatch is logged and the data is still returned.
    pub async fn load_from_cloud(&self) -> Option<SaveSnapshot> {
        let (writer, session) = self.signed_in("load_from_cloud")?;
        match self.fetch_remote(&*writer.backend, &session).await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                self.read_failed("load_from_cloud", &e);
                None
            }
        }
    }

    async fn fetch_remote(
        &self,
        backend: &dyn Backend,
        session: &Session,
    ) -> SyncResult<Option<SaveSnapshot>> {
        let Some(row) = backend.fetch_cloud_save(session).await? else {
            debug!(user_id = %session.user_id, "no cloud save yet");
            return Ok(None);
        };

        let intact = row.checksum_matches().unwrap_or(false);
        if !intact {
            warn!(
                user_id = %row.user_id,
                stored = %row.save_checksum,
                version = row.save_version,
                "cloud save checksum mismatch"
            );
            self.stats.lock().integrity_mismatches += 1;
        }
        Ok(Some(row.save_data))
    }

    /// Reconciles `local` with the cloud save.
    ///
    /// With no remote save the local snapshot is uploaded unchanged. Otherwise
    /// both are merged and the merged snapshot is uploaded and returned. If the
    /// remote save cannot be read, `local` is returned as authoritative and
    /// nothing is uploaded.
    pub async fn sync_save(&self, local: SaveSnapshot) -> SaveSyncResult {
        let Some((writer, session)) = self.signed_in("sync_save") else {
            return SaveSyncResult::local_only(local);
        };

        let remote = match self.fetch_remote(&*writer.backend, &session).await {
            Ok(remote) => remote,
            Err(e) => {
                self.read_failed("sync_save", &e);
                return SaveSyncResult::local_only(local);
            }
        };

        let (snapshot, action) = match remote {
            None => (local, SyncAction::UploadedLocal),
            Some(remote) => {
                let merged = merge(&local, &remote);
                debug!(
                    local_souls = local.souls,
                    remote_souls = remote.souls,
                    merged_souls = merged.souls,
                    "merged local and cloud saves"
                );
                (merged, SyncAction::Merged)
            }
        };

        let uploaded = writer.upload_save(&session, snapshot.clone()).await.is_ok();
        self.stats.lock().last_sync_time = Some(Utc::now());
        info!(?action, uploaded, "save synced");

        SaveSyncResult {
            snapshot,
            action,
            uploaded,
        }
    }

    /// Deletes the cloud save, cancelling any pending debounced save first.
    pub async fn delete_cloud_save(&self) -> bool {
        let Some((writer, session)) = self.signed_in("delete_cloud_save") else {
            return false;
        };
        if self.debouncer.cancel() {
            debug!("cancelled pending save before delete");
        }

        match writer.backend.delete_cloud_save(&session).await {
            Ok(()) => {
                info!(user_id = %session.user_id, "cloud save deleted");
                true
            }
            Err(e) => {
                warn!(error = %e, "cloud save delete failed");
                self.stats.lock().last_error = Some(format!("delete_cloud_save: {}", e));
                false
            }
        }
    }

    // ========================================================================
    // Profile
    // ========================================================================

    /// Writes the player's soul balance to their profile, with retries.
    pub async fn save_profile(&self, souls: u64) -> bool {
        let Some((writer, session)) = self.signed_in("save_profile") else {
            return false;
        };
        let profile = PlayerProfile::new(session.user_id, souls, Utc::now());
        let backend = &*writer.backend;
        writer
            .write("upsert_profile", || backend.upsert_profile(&session, &profile))
            .await
            .is_ok()
    }

    /// Loads the player's profile. `None` if absent or on failure.
    pub async fn load_profile(&self) -> Option<PlayerProfile> {
        let (writer, session) = self.signed_in("load_profile")?;
        match writer.backend.fetch_profile(&session).await {
            Ok(profile) => profile,
            Err(e) => {
                self.read_failed("load_profile", &e);
                None
            }
        }
    }

    // ========================================================================
    // Cache maintenance
    // ========================================================================

    /// Removes stale entries from both caches. Returns how many were removed.
    pub fn sweep_caches(&self) -> usize {
        let removed = self.leaderboard_cache.lock().sweep_expired()
            + self.personal_bests_cache.lock().sweep_expired();
        if removed > 0 {
            debug!(removed, "swept expired cache entries");
        }
        removed
    }

    /// Spawns a task sweeping both caches every `cache_sweep_interval`.
    ///
    /// The task holds only a weak reference and ends once the service is
    /// dropped.
    pub fn spawn_cache_sweeper(self: &Arc<Self>) -> JoinHandle<()> {
        let service: Weak<Self> = Arc::downgrade(self);
        let period = self.config.cache_sweep_interval;

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(service) = service.upgrade() else {
                    debug!("sync service dropped, stopping cache sweeper");
                    break;
                };
                service.sweep_caches();
            }
        })
    }
}

/// Rank for a score beaten by `above` others, or `-1` if it does not fit.
fn rank_above(above: u64) -> i64 {
    i64::try_from(above)
        .ok()
        .and_then(|n| n.checked_add(1))
        .unwrap_or(-1)
}

impl std::fmt::Debug for SyncService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncService")
            .field("available", &self.is_available())
            .field("signed_in", &self.is_signed_in())
            .field("debouncer", &self.debouncer)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{MemoryBackend, Operation};
    use crate::config::RetryConfig;
    use soulsync_testkit::prelude::*;
    use std::time::Duration;
    use tokio::time::advance;

    fn config() -> SyncConfig {
        SyncConfig::new("memory://", "test-key")
            .with_retry(RetryConfig::new(2, Duration::from_millis(10)))
            .with_save_debounce(Duration::from_millis(100))
    }

    fn service(backend: &Arc<MemoryBackend>) -> SyncService {
        SyncService::new(
            config(),
            Arc::clone(backend) as Arc<dyn Backend>,
            Arc::new(MemorySessionStore::new()),
        )
    }

    fn seeded_backend() -> Arc<MemoryBackend> {
        let backend = Arc::new(MemoryBackend::new());
        for (id, score) in [(1, 100), (2, 90), (3, 80)] {
            backend.seed_score(leaderboard_row(id, score, chrono::Duration::hours(1)));
        }
        backend
    }

    #[tokio::test]
    async fn rank_counts_strictly_greater_scores() {
        let backend = seeded_backend();
        let service = service(&backend);

        assert_eq!(service.get_rank_for_score(85).await, 3);
        assert_eq!(service.get_rank_for_score(1_000).await, 1);
    }

    #[tokio::test]
    async fn leaderboard_is_ranked_and_capped() {
        let backend = seeded_backend();
        let service = service(&backend);

        let entries = service.get_leaderboard(2, TimeFilter::All).await;
        let ranked: Vec<(u64, u32)> = entries.iter().map(|e| (e.row.score, e.rank)).collect();
        assert_eq!(ranked, vec![(100, 1), (90, 2)]);
    }

    #[tokio::test]
    async fn leaderboard_time_filter() {
        let backend = seeded_backend();
        backend.seed_score(leaderboard_row(4, 500, chrono::Duration::days(3)));
        let service = service(&backend);

        let weekly = service.get_leaderboard(10, TimeFilter::Weekly).await;
        assert_eq!(weekly[0].row.score, 500);

        let daily = service.get_leaderboard(10, TimeFilter::Daily).await;
        assert_eq!(daily.len(), 3);
        assert_eq!(daily[0].row.score, 100);
    }

    #[tokio::test(start_paused = true)]
    async fn leaderboard_cached_until_ttl() {
        let backend = seeded_backend();
        let service = service(&backend);

        service.get_leaderboard(10, TimeFilter::All).await;
        service.get_leaderboard(10, TimeFilter::All).await;
        assert_eq!(backend.calls(Operation::ReadLeaderboard), 1);

        // Different key, separate entry.
        service.get_leaderboard(5, TimeFilter::All).await;
        assert_eq!(backend.calls(Operation::ReadLeaderboard), 2);

        advance(config().leaderboard_ttl + Duration::from_secs(1)).await;
        service.get_leaderboard(10, TimeFilter::All).await;
        assert_eq!(backend.calls(Operation::ReadLeaderboard), 3);

        let stats = service.stats();
        assert_eq!(stats.cache_hits, 1);
        assert_eq!(stats.cache_misses, 3);
    }

    #[tokio::test]
    async fn submit_invalidates_leaderboard_cache() {
        let backend = seeded_backend();
        let service = service(&backend);

        service.get_leaderboard(10, TimeFilter::All).await;
        let row = service.submit_score(new_score("Ayla", 95)).await.unwrap();
        assert!(row.id > 3);

        let entries = service.get_leaderboard(10, TimeFilter::All).await;
        assert_eq!(backend.calls(Operation::ReadLeaderboard), 2);
        assert_eq!(entries[1].row.player_name, "Ayla");
        assert_eq!(entries[1].rank, 2);
    }

    #[tokio::test]
    async fn reads_fail_soft_without_retry() {
        let backend = seeded_backend();
        let service = service(&backend);

        backend.fail_next(Operation::ReadLeaderboard, 2);
        assert!(service.get_leaderboard(10, TimeFilter::All).await.is_empty());
        assert_eq!(service.get_rank_for_score(85).await, -1);
        assert_eq!(backend.calls(Operation::ReadLeaderboard), 2);
        assert_eq!(service.stats().read_failures, 2);

        // The failure was not cached.
        assert_eq!(service.get_leaderboard(10, TimeFilter::All).await.len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn submit_retries_transient_failures() {
        let backend = Arc::new(MemoryBackend::new());
        let service = service(&backend);

        backend.fail_next(Operation::InsertScore, 2);
        assert!(service.submit_score(new_score("Ayla", 10)).await.is_some());
        assert_eq!(backend.calls(Operation::InsertScore), 3);
        assert_eq!(service.stats().retries, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn submit_gives_up_after_max_retries() {
        let backend = Arc::new(MemoryBackend::new());
        let service = service(&backend);

        backend.fail_always(Operation::InsertScore);
        assert!(service.submit_score(new_score("Ayla", 10)).await.is_none());
        assert_eq!(backend.calls(Operation::InsertScore), 3);

        let stats = service.stats();
        assert_eq!(stats.writes_failed, 1);
        assert!(stats.last_error.unwrap().contains("insert_score"));
    }

    #[tokio::test]
    async fn invalid_score_never_reaches_backend() {
        let backend = Arc::new(MemoryBackend::new());
        let service = service(&backend);

        assert!(service.submit_score(new_score("", 10)).await.is_none());
        assert_eq!(backend.calls(Operation::InsertScore), 0);
    }

    #[tokio::test]
    async fn personal_bests_require_session() {
        let backend = seeded_backend();
        let service = service(&backend);
        assert!(service.get_personal_bests(5).await.is_none());

        let session = service.sign_in_anonymously().await.unwrap();
        backend.seed_score(owned_row(10, 40, session.user_id));
        backend.seed_score(owned_row(11, 70, session.user_id));

        let bests = service.get_personal_bests(5).await.unwrap();
        let scores: Vec<u64> = bests.iter().map(|e| e.row.score).collect();
        assert_eq!(scores, vec![70, 40]);
    }

    #[tokio::test(start_paused = true)]
    async fn personal_bests_cached_until_ttl_and_invalidated_by_submit() {
        let backend = Arc::new(MemoryBackend::new());
        let service = service(&backend);
        let session = service.sign_in_anonymously().await.unwrap();
        backend.seed_score(owned_row(10, 40, session.user_id));

        assert_eq!(service.get_personal_bests(5).await.unwrap().len(), 1);
        assert_eq!(service.get_personal_bests(5).await.unwrap().len(), 1);
        assert_eq!(backend.calls(Operation::ReadLeaderboard), 1);

        // Outlives the leaderboard TTL.
        let config = config();
        assert!(config.personal_bests_ttl > config.leaderboard_ttl);
        advance(config.leaderboard_ttl + Duration::from_secs(1)).await;
        service.get_personal_bests(5).await;
        assert_eq!(backend.calls(Operation::ReadLeaderboard), 1);

        assert!(service.submit_score(new_score("Ayla", 90)).await.is_some());
        let bests = service.get_personal_bests(5).await.unwrap();
        assert_eq!(backend.calls(Operation::ReadLeaderboard), 2);
        let scores: Vec<u64> = bests.iter().map(|e| e.row.score).collect();
        assert_eq!(scores, vec![90, 40]);

        advance(config.personal_bests_ttl + Duration::from_secs(1)).await;
        service.get_personal_bests(5).await;
        assert_eq!(backend.calls(Operation::ReadLeaderboard), 3);
    }

    #[test]
    fn rank_saturates_to_failure_value() {
        assert_eq!(rank_above(0), 1);
        assert_eq!(rank_above(2), 3);
        assert_eq!(rank_above(i64::MAX as u64 - 1), i64::MAX);
        assert_eq!(rank_above(i64::MAX as u64), -1);
        assert_eq!(rank_above(u64::MAX), -1);
    }

    #[tokio::test(start_paused = true)]
    async fn burst_of_saves_writes_last_snapshot_once() {
        let backend = Arc::new(MemoryBackend::new());
        let service = service(&backend);
        let session = service.sign_in_anonymously().await.unwrap();

        let (a, b, c) = tokio::join!(
            service.save_to_cloud(snapshot_with(10, &["katana"])),
            service.save_to_cloud(snapshot_with(20, &["katana"])),
            service.save_to_cloud(snapshot_with(30, &["katana", "scythe"])),
        );
        assert!(a && b && c);

        let writes = backend.save_writes();
        assert_eq!(writes.len(), 1);
        assert_eq!(writes[0].save_data.souls, 30);
        assert_eq!(backend.stored_save(session.user_id).unwrap().save_data.souls, 30);
    }

    #[tokio::test(start_paused = true)]
    async fn save_fails_after_retries() {
        let backend = Arc::new(MemoryBackend::new());
        let service = service(&backend);
        service.sign_in_anonymously().await.unwrap();

        backend.fail_always(Operation::WriteSave);
        assert!(!service.save_to_cloud(mid_game_snapshot()).await);
        assert_eq!(backend.calls(Operation::WriteSave), 3);
        assert_eq!(service.stats().writes_failed, 1);
    }

    #[tokio::test]
    async fn save_without_session_is_false() {
        let backend = Arc::new(MemoryBackend::new());
        let service = service(&backend);

        assert!(!service.save_to_cloud(mid_game_snapshot()).await);
        assert_eq!(backend.calls(Operation::WriteSave), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn load_returns_saved_snapshot() {
        let backend = Arc::new(MemoryBackend::new());
        let service = service(&backend);
        service.sign_in_anonymously().await.unwrap();
        assert!(service.load_from_cloud().await.is_none());

        let snapshot = mid_game_snapshot();
        assert!(service.save_to_cloud(snapshot.clone()).await);
        assert_eq!(service.load_from_cloud().await, Some(snapshot));
        assert_eq!(service.stats().integrity_mismatches, 0);
    }

    #[tokio::test]
    async fn checksum_mismatch_still_returns_data() {
        let backend = Arc::new(MemoryBackend::new());
        let service = service(&backend);
        let session = service.sign_in_anonymously().await.unwrap();

        let mut row = CloudSaveRow::new(session.user_id, mid_game_snapshot(), Utc::now()).unwrap();
        row.save_data.souls += 1;
        backend.seed_save(row);

        let loaded = service.load_from_cloud().await.unwrap();
        assert_eq!(loaded.souls, mid_game_snapshot().souls + 1);
        assert_eq!(service.stats().integrity_mismatches, 1);
    }

    #[tokio::test]
    async fn sync_without_remote_uploads_local_unchanged() {
        let backend = Arc::new(MemoryBackend::new());
        let service = service(&backend);
        let session = service.sign_in_anonymously().await.unwrap();

        let local = mid_game_snapshot();
        let result = service.sync_save(local.clone()).await;

        assert_eq!(result.action, SyncAction::UploadedLocal);
        assert!(result.uploaded);
        assert_eq!(result.snapshot, local);
        assert_eq!(backend.stored_save(session.user_id).unwrap().save_data, local);
    }

    #[tokio::test]
    async fn sync_merges_with_remote() {
        let backend = Arc::new(MemoryBackend::new());
        let service = service(&backend);
        let session = service.sign_in_anonymously().await.unwrap();

        let remote = snapshot_with(80, &["B", "C"]);
        backend.seed_save(CloudSaveRow::new(session.user_id, remote, Utc::now()).unwrap());

        let result = service.sync_save(snapshot_with(50, &["A", "B"])).await;
        assert_eq!(result.action, SyncAction::Merged);
        assert_eq!(result.snapshot.souls, 80);
        let weapons: Vec<&str> = result
            .snapshot
            .unlocked_weapons
            .iter()
            .map(String::as_str)
            .collect();
        assert_eq!(weapons, vec!["A", "B", "C"]);

        let stored = backend.stored_save(session.user_id).unwrap();
        assert_eq!(stored.save_data, result.snapshot);
        assert!(stored.checksum_matches().unwrap());
        assert!(service.stats().last_sync_time.is_some());
    }

    #[tokio::test]
    async fn sync_keeps_local_when_remote_unreadable() {
        let backend = Arc::new(MemoryBackend::new());
        let service = service(&backend);
        service.sign_in_anonymously().await.unwrap();

        backend.fail_next(Operation::FetchSave, 1);
        let local = snapshot_with(5, &["katana"]);
        let result = service.sync_save(local.clone()).await;

        assert_eq!(result.action, SyncAction::LocalOnly);
        assert!(!result.uploaded);
        assert_eq!(result.snapshot, local);
        assert!(backend.save_writes().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn delete_cancels_pending_save() {
        let backend = Arc::new(MemoryBackend::new());
        let service = service(&backend);
        let session = service.sign_in_anonymously().await.unwrap();

        let (saved, deleted) = tokio::join!(
            service.save_to_cloud(mid_game_snapshot()),
            service.delete_cloud_save(),
        );
        assert!(!saved);
        assert!(deleted);

        advance(Duration::from_secs(1)).await;
        assert!(backend.save_writes().is_empty());
        assert!(backend.stored_save(session.user_id).is_none());
    }

    #[tokio::test]
    async fn sign_out_clears_session_and_caches() {
        let backend = seeded_backend();
        let store = Arc::new(MemorySessionStore::new());
        let service = SyncService::new(
            config(),
            Arc::clone(&backend) as Arc<dyn Backend>,
            Arc::clone(&store) as Arc<dyn SessionStore>,
        );

        service.sign_in_anonymously().await.unwrap();
        service.get_leaderboard(10, TimeFilter::All).await;
        assert!(store.load().unwrap().is_some());

        service.sign_out().await;
        assert!(!service.is_signed_in());
        assert!(store.load().unwrap().is_none());

        service.get_leaderboard(10, TimeFilter::All).await;
        assert_eq!(backend.calls(Operation::ReadLeaderboard), 2);
        assert!(!service.delete_cloud_save().await);
    }

    #[tokio::test]
    async fn stored_session_is_restored() {
        let backend = Arc::new(MemoryBackend::new());
        let store: Arc<dyn SessionStore> = Arc::new(MemorySessionStore::new());

        let first = SyncService::new(
            config(),
            Arc::clone(&backend) as Arc<dyn Backend>,
            Arc::clone(&store),
        );
        let original = first.sign_in_anonymously().await.unwrap();
        // Signing in again reuses the active session.
        assert_eq!(first.sign_in_anonymously().await, Some(original.clone()));

        let second = SyncService::new(config(), backend.clone() as Arc<dyn Backend>, store);
        let restored = second.sign_in_anonymously().await.unwrap();
        assert_eq!(restored.user_id, original.user_id);
        assert_eq!(backend.sessions_issued(), 2);
    }

    #[tokio::test]
    async fn invalid_stored_session_falls_back_to_fresh_sign_in() {
        let backend = Arc::new(MemoryBackend::new());
        let stale = Session {
            user_id: uuid::Uuid::new_v4(),
            access_token: "stale".into(),
            refresh_token: None,
            expires_at: None,
        };
        let service = SyncService::new(
            config(),
            Arc::clone(&backend) as Arc<dyn Backend>,
            Arc::new(MemorySessionStore::with_session(stale.clone())),
        );

        let session = service.sign_in_anonymously().await.unwrap();
        assert_ne!(session.user_id, stale.user_id);
    }

    #[tokio::test]
    async fn offline_sign_in_returns_none() {
        let backend = Arc::new(MemoryBackend::new());
        backend.set_online(false);
        let service = service(&backend);

        assert!(service.sign_in_anonymously().await.is_none());
        assert!(!service.is_signed_in());
    }

    #[tokio::test(start_paused = true)]
    async fn profile_roundtrip() {
        let backend = Arc::new(MemoryBackend::new());
        let service = service(&backend);
        assert!(!service.save_profile(10).await);

        let session = service.sign_in_anonymously().await.unwrap();
        assert!(service.load_profile().await.is_none());
        assert!(service.save_profile(1_200).await);

        let profile = service.load_profile().await.unwrap();
        assert_eq!(profile.souls, 1_200);
        assert_eq!(backend.stored_profile(session.user_id).unwrap().souls, 1_200);
    }

    #[tokio::test]
    async fn unavailable_service_fails_soft() {
        let service = SyncService::unavailable(SyncConfig::unconfigured());
        assert!(!service.is_available());

        assert!(service.sign_in_anonymously().await.is_none());
        assert!(service.submit_score(new_score("Ayla", 10)).await.is_none());
        assert!(service.get_leaderboard(10, TimeFilter::All).await.is_empty());
        assert_eq!(service.get_rank_for_score(10).await, -1);
        assert!(service.get_personal_bests(10).await.is_none());
        assert!(!service.save_to_cloud(mid_game_snapshot()).await);
        assert!(service.load_from_cloud().await.is_none());
        assert!(!service.delete_cloud_save().await);
        assert!(!service.save_profile(1).await);
        assert!(service.load_profile().await.is_none());

        let result = service.sync_save(mid_game_snapshot()).await;
        assert_eq!(result.action, SyncAction::LocalOnly);
        service.sign_out().await;
    }

    #[test]
    fn from_config_without_credentials_is_unavailable() {
        let service = SyncService::from_config(SyncConfig::unconfigured());
        assert!(!service.is_available());
    }

    #[tokio::test(start_paused = true)]
    async fn sweeper_evicts_and_stops_with_service() {
        let backend = seeded_backend();
        let config = config()
            .with_leaderboard_ttl(Duration::from_secs(10))
            .with_cache_sweep_interval(Duration::from_secs(30));
        let service = Arc::new(SyncService::new(
            config,
            Arc::clone(&backend) as Arc<dyn Backend>,
            Arc::new(MemorySessionStore::new()),
        ));

        service.get_leaderboard(10, TimeFilter::All).await;
        let sweeper = service.spawn_cache_sweeper();

        advance(Duration::from_secs(31)).await;
        tokio::task::yield_now().await;
        assert_eq!(service.sweep_caches(), 0);

        drop(service);
        advance(Duration::from_secs(31)).await;
        sweeper.await.unwrap();
    }
}
