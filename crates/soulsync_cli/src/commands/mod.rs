//! CLI command implementations.

pub mod checksum;
pub mod leaderboard;
pub mod merge;
pub mod save;
pub mod verify;

use serde::Serialize;
use soulsync_engine::{SyncConfig, SyncService, ENV_API_KEY, ENV_URL};
use soulsync_protocol::SaveSnapshot;
use std::fs;
use std::path::{Path, PathBuf};

/// Session file used when neither `--session` nor the environment names one.
const DEFAULT_SESSION_FILE: &str = ".soulsync/session.cbor";

/// Builds a service from `.env` and the environment.
pub fn connect(session: Option<PathBuf>) -> Result<SyncService, Box<dyn std::error::Error>> {
    // A missing .env file is fine; real environment variables still apply.
    let _ = dotenvy::dotenv();

    let mut config = SyncConfig::from_env();
    if !config.is_configured() {
        return Err(format!("Set {} and {} to use online commands", ENV_URL, ENV_API_KEY).into());
    }
    if let Some(path) = session {
        config = config.with_session_path(path);
    } else if config.session_path.is_none() {
        config = config.with_session_path(DEFAULT_SESSION_FILE);
    }

    Ok(SyncService::from_config(config))
}

/// Signs in, failing the command if that is impossible.
pub async fn sign_in(service: &SyncService) -> Result<(), Box<dyn std::error::Error>> {
    match service.sign_in_anonymously().await {
        Some(session) => {
            tracing::debug!(user_id = %session.user_id, "using session");
            Ok(())
        }
        None => Err("Could not sign in to the cloud backend".into()),
    }
}

/// Reads a JSON snapshot from `path`.
pub fn read_snapshot(path: &Path) -> Result<SaveSnapshot, Box<dyn std::error::Error>> {
    let json = fs::read_to_string(path)
        .map_err(|e| format!("Failed to read {}: {}", path.display(), e))?;
    Ok(SaveSnapshot::from_json(&json)?)
}

/// Writes `value` as pretty JSON to `output`, or to stdout.
pub fn write_json<T: Serialize>(
    value: &T,
    output: Option<&Path>,
) -> Result<(), Box<dyn std::error::Error>> {
    let json = serde_json::to_string_pretty(value)?;
    match output {
        Some(path) => {
            fs::write(path, json + "\n")
                .map_err(|e| format!("Failed to write {}: {}", path.display(), e))?;
            println!("Wrote {}", path.display());
        }
        None => println!("{}", json),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use soulsync_testkit::mid_game_snapshot;
    use tempfile::TempDir;

    #[test]
    fn snapshot_file_roundtrip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("save.json");
        let snapshot = mid_game_snapshot();

        write_json(&snapshot, Some(&path)).unwrap();
        assert_eq!(read_snapshot(&path).unwrap(), snapshot);
    }

    #[test]
    fn missing_file_names_path() {
        let err = read_snapshot(Path::new("/nonexistent/save.json")).unwrap_err();
        assert!(err.to_string().contains("/nonexistent/save.json"));
    }
}
