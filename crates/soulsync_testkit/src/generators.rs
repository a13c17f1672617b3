//! Property-based test generators using proptest.
//!
//! Identifiers are drawn from a small alphabet so that independently
//! generated snapshots overlap often enough to exercise conflict paths.

use chrono::{DateTime, Duration, Utc};
use proptest::prelude::*;
use soulsync_protocol::{LeaderboardRow, SaveSnapshot};
use std::collections::{BTreeMap, BTreeSet};

/// Strategy for short identifiers such as weapon or level names.
pub fn identifier_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-f][0-9]?").expect("Invalid regex")
}

/// Strategy for identifier sets.
pub fn identifier_set_strategy() -> impl Strategy<Value = BTreeSet<String>> {
    prop::collection::btree_set(identifier_strategy(), 0..6)
}

/// Strategy for identifier → level/score maps.
pub fn progress_map_strategy() -> impl Strategy<Value = BTreeMap<String, u64>> {
    prop::collection::btree_map(identifier_strategy(), 0u64..1_000, 0..6)
}

/// Strategy for whole save snapshots with a fixed timestamp.
pub fn snapshot_strategy() -> impl Strategy<Value = SaveSnapshot> {
    (
        0u64..1_000_000,
        identifier_set_strategy(),
        identifier_set_strategy(),
        identifier_set_strategy(),
        progress_map_strategy(),
        progress_map_strategy(),
        progress_map_strategy(),
        progress_map_strategy(),
        1u64..50,
    )
        .prop_map(
            |(
                souls,
                unlocked_weapons,
                completed_levels,
                personal_bests,
                weapon_tiers,
                upgrades,
                level_stars,
                high_scores,
                version,
            )| SaveSnapshot {
                souls,
                unlocked_weapons,
                completed_levels,
                personal_bests,
                weapon_tiers,
                upgrades,
                level_stars,
                high_scores,
                version,
                updated_at: fixed_time(),
            },
        )
}

/// Strategy for leaderboard rows created within the last ten days.
pub fn leaderboard_row_strategy() -> impl Strategy<Value = LeaderboardRow> {
    (1i64..100_000, 0u64..10_000, 0i64..(10 * 24 * 60)).prop_map(|(id, score, minutes_ago)| {
        LeaderboardRow {
            id,
            player_name: format!("player{id}"),
            score,
            weapon_used: "katana".into(),
            monsters_sliced: 0,
            max_combo: 0,
            time_elapsed_seconds: 30.0,
            created_at: Utc::now() - Duration::minutes(minutes_ago),
            user_id: None,
        }
    })
}

/// A fixed timestamp so generated snapshots compare equal on metadata.
pub fn fixed_time() -> DateTime<Utc> {
    DateTime::<Utc>::from_timestamp(1_700_000_000, 0).unwrap_or_default()
}
