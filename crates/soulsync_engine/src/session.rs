//! Local persistence of the anonymous session.
//!
//! The session token outlives the process so that the same anonymous account
//! is restored on the next launch. Caches are never persisted.

use crate::backend::Session;
use crate::error::{SyncError, SyncResult};
use parking_lot::Mutex;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

/// Device-local storage for the current session.
pub trait SessionStore: Send + Sync {
    /// Loads the stored session, if any.
    fn load(&self) -> SyncResult<Option<Session>>;

    /// Stores `session`, replacing any previous one.
    fn save(&self, session: &Session) -> SyncResult<()>;

    /// Removes the stored session.
    fn clear(&self) -> SyncResult<()>;
}

/// A session store that lives only as long as the process.
#[derive(Debug, Default)]
pub struct MemorySessionStore {
    session: Mutex<Option<Session>>,
}

impl MemorySessionStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store holding `session`.
    pub fn with_session(session: Session) -> Self {
        Self {
            session: Mutex::new(Some(session)),
        }
    }
}

impl SessionStore for MemorySessionStore {
    fn load(&self) -> SyncResult<Option<Session>> {
        Ok(self.session.lock().clone())
    }

    fn save(&self, session: &Session) -> SyncResult<()> {
        *self.session.lock() = Some(session.clone());
        Ok(())
    }

    fn clear(&self) -> SyncResult<()> {
        *self.session.lock() = None;
        Ok(())
    }
}

/// A session store backed by a CBOR file.
#[derive(Debug, Clone)]
pub struct FileSessionStore {
    path: PathBuf,
}

impl FileSessionStore {
    /// Creates a store at `path`. The file is created on first save.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Returns the file path.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SessionStore for FileSessionStore {
    fn load(&self) -> SyncResult<Option<Session>> {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(SyncError::SessionStore(e.to_string())),
        };
        ciborium::from_reader(bytes.as_slice())
            .map(Some)
            .map_err(|e| SyncError::Codec(format!("Failed to decode session: {}", e)))
    }

    fn save(&self, session: &Session) -> SyncResult<()> {
        let mut bytes = Vec::new();
        ciborium::into_writer(session, &mut bytes)
            .map_err(|e| SyncError::Codec(format!("Failed to encode session: {}", e)))?;

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|e| SyncError::SessionStore(e.to_string()))?;
        }

        // Write then rename so a crash never leaves a torn file.
        let tmp = self.path.with_extension("tmp");
        fs::write(&tmp, &bytes).map_err(|e| SyncError::SessionStore(e.to_string()))?;
        fs::rename(&tmp, &self.path).map_err(|e| SyncError::SessionStore(e.to_string()))
    }

    fn clear(&self) -> SyncResult<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(SyncError::SessionStore(e.to_string())),
        }
    }
}
