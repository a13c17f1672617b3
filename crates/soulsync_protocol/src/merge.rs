//! Conflict resolution for concurrently modified saves.
//!
//! Two snapshots of the same account are merged field by field with the
//! merge-max policy:
//! - scalars take the larger value
//! - sets take the union
//! - maps take the key-wise maximum, passing through keys found on one side
//!
//! Every per-field operator is commutative and idempotent, so repeated
//! pairwise merges converge on the same value from any order.

use crate::snapshot::SaveSnapshot;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, BTreeSet};

/// Merges a local and a remote snapshot, stamping the result with the current time.
pub fn merge(local: &SaveSnapshot, remote: &SaveSnapshot) -> SaveSnapshot {
    merge_at(local, remote, Utc::now())
}

/// Merges a local and a remote snapshot, stamping the result with `merged_at`.
pub fn merge_at(
    local: &SaveSnapshot,
    remote: &SaveSnapshot,
    merged_at: DateTime<Utc>,
) -> SaveSnapshot {
    SaveSnapshot {
        souls: local.souls.max(remote.souls),
        unlocked_weapons: union(&local.unlocked_weapons, &remote.unlocked_weapons),
        completed_levels: union(&local.completed_levels, &remote.completed_levels),
        personal_bests: union(&local.personal_bests, &remote.personal_bests),
        weapon_tiers: max_by_key(&local.weapon_tiers, &remote.weapon_tiers),
        upgrades: max_by_key(&local.upgrades, &remote.upgrades),
        level_stars: max_by_key(&local.level_stars, &remote.level_stars),
        high_scores: max_by_key(&local.high_scores, &remote.high_scores),
        version: local.version.max(remote.version),
        updated_at: merged_at,
    }
}

fn union(local: &BTreeSet<String>, remote: &BTreeSet<String>) -> BTreeSet<String> {
    local.union(remote).cloned().collect()
}

fn max_by_key(
    local: &BTreeMap<String, u64>,
    remote: &BTreeMap<String, u64>,
) -> BTreeMap<String, u64> {
    let mut merged = local.clone();
    for (key, &value) in remote {
        merged
            .entry(key.clone())
            .and_modify(|existing| *existing = (*existing).max(value))
            .or_insert(value);
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(souls: u64, weapons: &[&str]) -> SaveSnapshot {
        let mut s = SaveSnapshot::default();
        s.souls = souls;
        s.unlocked_weapons = weapons.iter().map(|w| w.to_string()).collect();
        s
    }

    #[test]
    fn souls_take_max() {
        let local = snapshot(50, &[]);
        let remote = snapshot(80, &[]);
        assert_eq!(merge(&local, &remote).souls, 80);
        assert_eq!(merge(&remote, &local).souls, 80);
    }

    #[test]
    fn weapons_union() {
        let local = snapshot(0, &["A", "B"]);
        let remote = snapshot(0, &["B", "C"]);
        let merged = merge(&local, &remote);
        let weapons: Vec<_> = merged.unlocked_weapons.iter().map(String::as_str).collect();
        assert_eq!(weapons, vec!["A", "B", "C"]);
    }

    #[test]
    fn maps_keywise_max_with_pass_through() {
        let mut local = SaveSnapshot::default();
        local.level_stars.insert("level_1".into(), 3);
        local.level_stars.insert("level_2".into(), 1);

        let mut remote = SaveSnapshot::default();
        remote.level_stars.insert("level_2".into(), 2);
        remote.level_stars.insert("level_3".into(), 1);

        let merged = merge(&local, &remote);
        assert_eq!(merged.level_stars.get("level_1"), Some(&3));
        assert_eq!(merged.level_stars.get("level_2"), Some(&2));
        assert_eq!(merged.level_stars.get("level_3"), Some(&1));
    }

    #[test]
    fn merge_time_stamps_result() {
        let local = snapshot(1, &[]);
        let remote = snapshot(2, &[]);
        let at = DateTime::parse_from_rfc3339("2024-05-01T12:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        assert_eq!(merge_at(&local, &remote, at).updated_at, at);
    }

    #[test]
    fn version_takes_max() {
        let mut local = snapshot(0, &[]);
        local.version = 4;
        let mut remote = snapshot(0, &[]);
        remote.version = 7;
        assert_eq!(merge(&local, &remote).version, 7);
    }

    #[test]
    fn idempotent() {
        let mut x = snapshot(10, &["katana", "scythe"]);
        x.upgrades.insert("dash".into(), 2);
        let merged = merge_at(&x, &x, x.updated_at);
        assert_eq!(merged, x);
    }
}
