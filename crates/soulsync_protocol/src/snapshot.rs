//! Player save snapshots.

use crate::checksum::Checksum;
use crate::error::ProtocolResult;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// A complete, serializable record of a player's progress.
///
/// Sets and maps are ordered so that the canonical JSON form, and therefore
/// the checksum, is stable regardless of insertion order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SaveSnapshot {
    /// Soul currency balance.
    pub souls: u64,
    /// Weapons the player has unlocked.
    pub unlocked_weapons: BTreeSet<String>,
    /// Levels the player has completed.
    pub completed_levels: BTreeSet<String>,
    /// Identifiers of personal-best records achieved.
    pub personal_bests: BTreeSet<String>,
    /// Tier reached per weapon.
    pub weapon_tiers: BTreeMap<String, u64>,
    /// Upgrade level per upgrade.
    pub upgrades: BTreeMap<String, u64>,
    /// Stars earned per level.
    pub level_stars: BTreeMap<String, u64>,
    /// Best score per level.
    pub high_scores: BTreeMap<String, u64>,
    /// Save format/progress version. Informational only.
    pub version: u64,
    /// When this snapshot was last written or merged.
    pub updated_at: DateTime<Utc>,
}

impl SaveSnapshot {
    /// Creates an empty snapshot stamped with the current time.
    pub fn new() -> Self {
        Self::at(Utc::now())
    }

    /// Creates an empty snapshot stamped with `updated_at`.
    pub fn at(updated_at: DateTime<Utc>) -> Self {
        Self {
            souls: 0,
            unlocked_weapons: BTreeSet::new(),
            completed_levels: BTreeSet::new(),
            personal_bests: BTreeSet::new(),
            weapon_tiers: BTreeMap::new(),
            upgrades: BTreeMap::new(),
            level_stars: BTreeMap::new(),
            high_scores: BTreeMap::new(),
            version: 1,
            updated_at,
        }
    }

    /// Serializes to the canonical JSON form used for checksums and storage.
    pub fn to_canonical_json(&self) -> ProtocolResult<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Parses a snapshot from JSON. Missing fields take their defaults.
    pub fn from_json(json: &str) -> ProtocolResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Computes the checksum of the canonical JSON form.
    pub fn checksum(&self) -> ProtocolResult<Checksum> {
        Ok(Checksum::of(self.to_canonical_json()?.as_bytes()))
    }

    /// Returns true if both snapshots hold the same progress, ignoring
    /// `version` and `updated_at`.
    pub fn same_progress(&self, other: &SaveSnapshot) -> bool {
        self.souls == other.souls
            && self.unlocked_weapons == other.unlocked_weapons
            && self.completed_levels == other.completed_levels
            && self.personal_bests == other.personal_bests
            && self.weapon_tiers == other.weapon_tiers
            && self.upgrades == other.upgrades
            && self.level_stars == other.level_stars
            && self.high_scores == other.high_scores
    }
}

impl Default for SaveSnapshot {
    fn default() -> Self {
        Self::at(DateTime::<Utc>::default())
    }
}
