//! Verify command implementation.

use soulsync_protocol::{Checksum, CloudSaveRow, SaveSnapshot};
use std::fs;
use std::path::Path;

/// Verification result.
#[derive(Debug, PartialEq, Eq)]
pub struct VerifyResult {
    /// Checksum the data was expected to have.
    pub expected: Checksum,
    /// Checksum computed from the data.
    pub actual: Checksum,
}

impl VerifyResult {
    fn is_ok(&self) -> bool {
        self.expected == self.actual
    }
}

/// Runs the verify command.
pub fn run(path: &Path, expected: Option<&str>) -> Result<(), Box<dyn std::error::Error>> {
    let json = fs::read_to_string(path)
        .map_err(|e| format!("Failed to read {}: {}", path.display(), e))?;
    println!("Verifying save at {}", path.display());

    let result = verify(&json, expected)?;
    println!("  expected: {}", result.expected);
    println!("  actual:   {}", result.actual);
    println!();

    if result.is_ok() {
        println!("✓ Save verification passed");
        Ok(())
    } else {
        println!("✗ Save verification failed");
        Err("Verification failed".into())
    }
}

/// Checks `json` against `expected`, or against the stored checksum when
/// `json` is an exported cloud save row.
fn verify(json: &str, expected: Option<&str>) -> Result<VerifyResult, Box<dyn std::error::Error>> {
    let (snapshot, stored) = match serde_json::from_str::<CloudSaveRow>(json) {
        Ok(row) => (row.save_data, Some(row.save_checksum)),
        Err(_) => (SaveSnapshot::from_json(json)?, None),
    };

    let expected = match expected.map(str::to_string).or(stored) {
        Some(hex) => hex.parse::<Checksum>()?,
        None => return Err("No checksum to compare against; pass --expected".into()),
    };

    Ok(VerifyResult {
        expected,
        actual: snapshot.checksum()?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use soulsync_testkit::mid_game_snapshot;
    use uuid::Uuid;

    #[test]
    fn row_with_intact_checksum_passes() {
        let row = CloudSaveRow::new(Uuid::new_v4(), mid_game_snapshot(), Utc::now()).unwrap();
        let json = serde_json::to_string(&row).unwrap();
        assert!(verify(&json, None).unwrap().is_ok());
    }

    #[test]
    fn tampered_row_fails() {
        let mut row = CloudSaveRow::new(Uuid::new_v4(), mid_game_snapshot(), Utc::now()).unwrap();
        row.save_data.souls = 999_999;
        let json = serde_json::to_string(&row).unwrap();
        assert!(!verify(&json, None).unwrap().is_ok());
    }

    #[test]
    fn bare_snapshot_needs_expected() {
        let snapshot = mid_game_snapshot();
        let json = snapshot.to_canonical_json().unwrap();

        assert!(verify(&json, None).is_err());

        let checksum = snapshot.checksum().unwrap().to_string();
        assert!(verify(&json, Some(&checksum)).unwrap().is_ok());
        assert!(!verify(&json, Some("00000000")).unwrap().is_ok());
    }
}
