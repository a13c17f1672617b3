//! Rows of the `cloud_saves` and `player_profiles` relations.

use crate::checksum::Checksum;
use crate::error::ProtocolResult;
use crate::snapshot::SaveSnapshot;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One account's cloud save. At most one row exists per `user_id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CloudSaveRow {
    /// Owning account.
    pub user_id: Uuid,
    /// The saved snapshot.
    pub save_data: SaveSnapshot,
    /// Copy of `save_data.version`, queryable without decoding the blob.
    pub save_version: u64,
    /// Fingerprint of the canonical JSON form of `save_data`.
    pub save_checksum: String,
    /// Time of the write.
    pub updated_at: DateTime<Utc>,
}

impl CloudSaveRow {
    /// Builds a checksummed row for `snapshot`.
    pub fn new(user_id: Uuid, snapshot: SaveSnapshot, now: DateTime<Utc>) -> ProtocolResult<Self> {
        let checksum = snapshot.checksum()?;
        Ok(Self {
            user_id,
            save_version: snapshot.version,
            save_checksum: checksum.to_string(),
            save_data: snapshot,
            updated_at: now,
        })
    }

    /// Recomputes the checksum of `save_data` and compares it to the stored one.
    ///
    /// An unparseable stored checksum counts as a mismatch.
    pub fn checksum_matches(&self) -> ProtocolResult<bool> {
        let computed = self.save_data.checksum()?;
        Ok(self
            .save_checksum
            .parse::<Checksum>()
            .map(|stored| stored == computed)
            .unwrap_or(false))
    }
}

/// Per-account profile row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerProfile {
    /// Owning account.
    pub user_id: Uuid,
    /// Soul currency balance.
    pub souls: u64,
    /// Time of the last write.
    pub updated_at: DateTime<Utc>,
}

impl PlayerProfile {
    /// Creates a profile stamped with `now`.
    pub fn new(user_id: Uuid, souls: u64, now: DateTime<Utc>) -> Self {
        Self {
            user_id,
            souls,
            updated_at: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_row_is_consistent() {
        let mut snapshot = SaveSnapshot::default();
        snapshot.souls = 300;
        snapshot.version = 5;

        let row = CloudSaveRow::new(Uuid::new_v4(), snapshot, Utc::now()).unwrap();
        assert_eq!(row.save_version, 5);
        assert_eq!(row.save_checksum.len(), 8);
        assert!(row.checksum_matches().unwrap());
    }

    #[test]
    fn tampered_row_mismatches() {
        let mut row = CloudSaveRow::new(Uuid::new_v4(), SaveSnapshot::default(), Utc::now()).unwrap();
        row.save_data.souls = 999_999;
        assert!(!row.checksum_matches().unwrap());

        row.save_checksum = "not-hex".into();
        assert!(!row.checksum_matches().unwrap());
    }

    #[test]
    fn row_wire_format() {
        let row = CloudSaveRow::new(Uuid::nil(), SaveSnapshot::default(), Utc::now()).unwrap();
        let json = serde_json::to_value(&row).unwrap();
        assert!(json.get("save_data").unwrap().get("souls").is_some());
        assert_eq!(json["save_version"], 1);
    }
}
