//! Merge command implementation.

use super::{read_snapshot, write_json};
use soulsync_protocol::merge;
use std::path::Path;
use tracing::info;

/// Runs the merge command.
pub fn run(local: &Path, remote: &Path, output: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    let local_save = read_snapshot(local)?;
    let remote_save = read_snapshot(remote)?;

    let merged = merge(&local_save, &remote_save);
    info!(
        local_souls = local_save.souls,
        remote_souls = remote_save.souls,
        merged_souls = merged.souls,
        "Merged {:?} with {:?}",
        local,
        remote
    );

    write_json(&merged, output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use soulsync_testkit::snapshot_with;
    use tempfile::TempDir;

    #[test]
    fn merges_files_on_disk() {
        let dir = TempDir::new().unwrap();
        let local = dir.path().join("local.json");
        let remote = dir.path().join("remote.json");
        let out = dir.path().join("merged.json");

        write_json(&snapshot_with(50, &["A", "B"]), Some(&local)).unwrap();
        write_json(&snapshot_with(80, &["B", "C"]), Some(&remote)).unwrap();
        run(&local, &remote, Some(&out)).unwrap();

        let merged = read_snapshot(&out).unwrap();
        assert_eq!(merged.souls, 80);
        assert_eq!(merged.unlocked_weapons.len(), 3);
    }
}
