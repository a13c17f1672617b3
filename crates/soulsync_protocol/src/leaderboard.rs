//! Leaderboard rows, time filters and client-side ranking.

use crate::error::{ProtocolError, ProtocolResult};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// A score as submitted by the game, before the server assigns an id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewScore {
    /// Display name of the player.
    pub player_name: String,
    /// Final score of the run.
    pub score: u64,
    /// Weapon used for the run.
    pub weapon_used: String,
    /// Number of monsters sliced.
    pub monsters_sliced: u32,
    /// Longest combo reached.
    pub max_combo: u32,
    /// Length of the run in seconds.
    pub time_elapsed_seconds: f64,
    /// Owning account, if signed in.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<Uuid>,
}

impl NewScore {
    /// Checks the score before it is sent anywhere.
    pub fn validate(&self) -> ProtocolResult<()> {
        if self.player_name.trim().is_empty() {
            return Err(ProtocolError::invalid("player_name", "must not be empty"));
        }
        if self.weapon_used.trim().is_empty() {
            return Err(ProtocolError::invalid("weapon_used", "must not be empty"));
        }
        if !self.time_elapsed_seconds.is_finite() || self.time_elapsed_seconds < 0.0 {
            return Err(ProtocolError::invalid(
                "time_elapsed_seconds",
                format!("{} is not a valid duration", self.time_elapsed_seconds),
            ));
        }
        Ok(())
    }
}

/// A stored leaderboard row. Immutable once created server-side.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeaderboardRow {
    /// Server-assigned id.
    pub id: i64,
    /// Display name of the player.
    pub player_name: String,
    /// Final score of the run.
    pub score: u64,
    /// Weapon used for the run.
    pub weapon_used: String,
    /// Number of monsters sliced.
    pub monsters_sliced: u32,
    /// Longest combo reached.
    pub max_combo: u32,
    /// Length of the run in seconds.
    pub time_elapsed_seconds: f64,
    /// Server creation time.
    pub created_at: DateTime<Utc>,
    /// Owning account, if any.
    #[serde(default)]
    pub user_id: Option<Uuid>,
}

/// A leaderboard row with its position in a fetched result set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeaderboardEntry {
    /// The stored row.
    #[serde(flatten)]
    pub row: LeaderboardRow,
    /// 1-based position within the result set.
    pub rank: u32,
}

/// Time window for leaderboard queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeFilter {
    /// Every score ever submitted.
    #[default]
    All,
    /// Scores from the last 7 days.
    Weekly,
    /// Scores from the last 24 hours.
    Daily,
}

impl TimeFilter {
    /// Returns the lower bound on `created_at` for this filter, relative to `now`.
    pub fn since(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match self {
            TimeFilter::All => None,
            TimeFilter::Weekly => Some(now - Duration::days(7)),
            TimeFilter::Daily => Some(now - Duration::days(1)),
        }
    }

    /// Returns the filter name.
    pub fn as_str(&self) -> &'static str {
        match self {
            TimeFilter::All => "all",
            TimeFilter::Weekly => "weekly",
            TimeFilter::Daily => "daily",
        }
    }
}

impl fmt::Display for TimeFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TimeFilter {
    type Err = ProtocolError;

    fn from_str(s: &str) -> ProtocolResult<Self> {
        match s.to_ascii_lowercase().as_str() {
            "all" => Ok(TimeFilter::All),
            "weekly" => Ok(TimeFilter::Weekly),
            "daily" => Ok(TimeFilter::Daily),
            _ => Err(ProtocolError::UnknownTimeFilter(s.to_string())),
        }
    }
}

/// A leaderboard read: highest scores first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeaderboardQuery {
    /// Maximum number of rows.
    pub limit: usize,
    /// Only rows created at or after this time.
    pub since: Option<DateTime<Utc>>,
    /// Only rows owned by this account.
    pub user_id: Option<Uuid>,
}

impl LeaderboardQuery {
    /// Creates a query for the top `limit` scores.
    pub fn top(limit: usize) -> Self {
        Self {
            limit,
            since: None,
            user_id: None,
        }
    }

    /// Restricts the query by a time filter relative to `now`.
    pub fn with_filter(mut self, filter: TimeFilter, now: DateTime<Utc>) -> Self {
        self.since = filter.since(now);
        self
    }

    /// Restricts the query to one account.
    pub fn for_user(mut self, user_id: Uuid) -> Self {
        self.user_id = Some(user_id);
        self
    }

    /// Returns true if `row` passes the query's filters.
    pub fn matches(&self, row: &LeaderboardRow) -> bool {
        self.since.map_or(true, |since| row.created_at >= since)
            && self.user_id.map_or(true, |user| row.user_id == Some(user))
    }
}

/// Orders rows by score descending, caps them at `limit` and numbers them from 1.
///
/// Ties keep their input order.
pub fn assign_ranks(mut rows: Vec<LeaderboardRow>, limit: usize) -> Vec<LeaderboardEntry> {
    rows.sort_by(|a, b| b.score.cmp(&a.score));
    rows.into_iter()
        .take(limit)
        .zip(1u32..)
        .map(|(row, rank)| LeaderboardEntry { row, rank })
        .collect()
}

/// Rank a score would take: the number of strictly greater scores, plus one.
pub fn rank_for_score<I>(scores: I, score: u64) -> u64
where
    I: IntoIterator<Item = u64>,
{
    scores.into_iter().filter(|&s| s > score).count() as u64 + 1
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(id: i64, score: u64) -> LeaderboardRow {
        LeaderboardRow {
            id,
            player_name: format!("player{id}"),
            score,
            weapon_used: "katana".into(),
            monsters_sliced: 10,
            max_combo: 3,
            time_elapsed_seconds: 60.0,
            created_at: Utc::now(),
            user_id: None,
        }
    }

    #[test]
    fn ranks_are_one_based_and_capped() {
        let entries = assign_ranks(vec![row(1, 90), row(2, 100), row(3, 80)], 2);
        assert_eq!(entries.len(), 2);
        assert_eq!((entries[0].row.score, entries[0].rank), (100, 1));
        assert_eq!((entries[1].row.score, entries[1].rank), (90, 2));
    }

    #[test]
    fn rank_counts_strictly_greater() {
        assert_eq!(rank_for_score([100, 90, 80], 85), 3);
        assert_eq!(rank_for_score([100, 90, 80], 90), 2);
        assert_eq!(rank_for_score([100, 90, 80], 200), 1);
        assert_eq!(rank_for_score(Vec::new(), 0), 1);
    }

    #[test]
    fn time_filter_bounds() {
        let now = Utc::now();
        assert_eq!(TimeFilter::All.since(now), None);
        assert_eq!(TimeFilter::Daily.since(now), Some(now - Duration::days(1)));
        assert_eq!(TimeFilter::Weekly.since(now), Some(now - Duration::days(7)));
    }

    #[test]
    fn time_filter_parse() {
        assert_eq!("weekly".parse::<TimeFilter>().unwrap(), TimeFilter::Weekly);
        assert_eq!("DAILY".parse::<TimeFilter>().unwrap(), TimeFilter::Daily);
        assert!("monthly".parse::<TimeFilter>().is_err());
        assert_eq!(TimeFilter::All.to_string(), "all");
    }

    #[test]
    fn query_matches_filters() {
        let now = Utc::now();
        let user = Uuid::new_v4();

        let mut old = row(1, 10);
        old.created_at = now - Duration::days(3);
        let mut mine = row(2, 20);
        mine.user_id = Some(user);

        let daily = LeaderboardQuery::top(10).with_filter(TimeFilter::Daily, now);
        assert!(!daily.matches(&old));
        assert!(daily.matches(&mine));

        let own = LeaderboardQuery::top(10).for_user(user);
        assert!(own.matches(&mine));
        assert!(!own.matches(&old));
    }

    #[test]
    fn validate_rejects_blank_name() {
        let mut score = NewScore {
            player_name: "  ".into(),
            score: 10,
            weapon_used: "katana".into(),
            monsters_sliced: 1,
            max_combo: 1,
            time_elapsed_seconds: 1.0,
            user_id: None,
        };
        assert!(score.validate().is_err());

        score.player_name = "Ayla".into();
        assert!(score.validate().is_ok());

        score.time_elapsed_seconds = f64::NAN;
        assert!(score.validate().is_err());
    }

    #[test]
    fn entry_flattens_row() {
        let entry = LeaderboardEntry {
            row: row(7, 55),
            rank: 1,
        };
        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["id"], 7);
        assert_eq!(json["rank"], 1);
    }
}
