//! Test fixtures for snapshots and leaderboard rows.

use chrono::{DateTime, Duration, Utc};
use soulsync_protocol::{LeaderboardRow, NewScore, SaveSnapshot};
use uuid::Uuid;

/// Builds a snapshot with the given souls and unlocked weapons.
pub fn snapshot_with(souls: u64, weapons: &[&str]) -> SaveSnapshot {
    let mut snapshot = SaveSnapshot::default();
    snapshot.souls = souls;
    snapshot.unlocked_weapons = weapons.iter().map(|w| w.to_string()).collect();
    snapshot
}

/// A mid-game snapshot touching every merge category.
pub fn mid_game_snapshot() -> SaveSnapshot {
    let mut snapshot = snapshot_with(1_250, &["katana", "scythe"]);
    snapshot.completed_levels.insert("graveyard".into());
    snapshot.completed_levels.insert("crypt".into());
    snapshot.personal_bests.insert("graveyard_time".into());
    snapshot.weapon_tiers.insert("katana".into(), 2);
    snapshot.upgrades.insert("dash".into(), 1);
    snapshot.level_stars.insert("graveyard".into(), 3);
    snapshot.high_scores.insert("graveyard".into(), 4_200);
    snapshot.version = 3;
    snapshot
}

/// Builds a score submission.
pub fn new_score(player_name: &str, score: u64) -> NewScore {
    NewScore {
        player_name: player_name.into(),
        score,
        weapon_used: "katana".into(),
        monsters_sliced: (score / 10) as u32,
        max_combo: 5,
        time_elapsed_seconds: 95.5,
        user_id: None,
    }
}

/// Builds a stored leaderboard row created `age` ago.
pub fn leaderboard_row(id: i64, score: u64, age: Duration) -> LeaderboardRow {
    leaderboard_row_at(id, score, Utc::now() - age)
}

/// Builds a stored leaderboard row created at `created_at`.
pub fn leaderboard_row_at(id: i64, score: u64, created_at: DateTime<Utc>) -> LeaderboardRow {
    LeaderboardRow {
        id,
        player_name: format!("player{id}"),
        score,
        weapon_used: "katana".into(),
        monsters_sliced: 0,
        max_combo: 0,
        time_elapsed_seconds: 60.0,
        created_at,
        user_id: None,
    }
}

/// Builds a row owned by `user_id`.
pub fn owned_row(id: i64, score: u64, user_id: Uuid) -> LeaderboardRow {
    let mut row = leaderboard_row(id, score, Duration::zero());
    row.user_id = Some(user_id);
    row
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mid_game_snapshot() {
        let snapshot = mid_game_snapshot();
        assert_eq!(snapshot.souls, 1_250);
        assert_eq!(snapshot.unlocked_weapons.len(), 2);
        assert!(snapshot.checksum().is_ok());
    }

    #[test]
    fn test_new_score_is_valid() {
        assert!(new_score("Ayla", 100).validate().is_ok());
    }

    #[test]
    fn test_owned_row() {
        let user = Uuid::new_v4();
        assert_eq!(owned_row(1, 10, user).user_id, Some(user));
    }
}
