//! Leaderboard and rank command implementations.

use soulsync_engine::SyncService;
use soulsync_protocol::{LeaderboardEntry, TimeFilter};

/// Runs the leaderboard command.
pub async fn run(
    service: &SyncService,
    limit: usize,
    filter: TimeFilter,
    format: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let entries = service.get_leaderboard(limit, filter).await;
    if entries.is_empty() && service.stats().read_failures > 0 {
        return Err("Leaderboard is unavailable".into());
    }

    if format == "json" {
        println!("{}", serde_json::to_string_pretty(&entries)?);
    } else {
        println!("Leaderboard ({}, top {})", filter, limit);
        println!();
        print_table(&entries);
    }
    Ok(())
}

fn print_table(entries: &[LeaderboardEntry]) {
    if entries.is_empty() {
        println!("  (no scores yet)");
        return;
    }
    println!("{:>4}  {:<20} {:>10}  {:<12} {:>6}", "RANK", "PLAYER", "SCORE", "WEAPON", "COMBO");
    for entry in entries {
        let row = &entry.row;
        println!(
            "{:>4}  {:<20} {:>10}  {:<12} {:>6}",
            entry.rank, row.player_name, row.score, row.weapon_used, row.max_combo
        );
    }
}

/// Runs the rank command.
pub async fn rank(service: &SyncService, score: u64) -> Result<(), Box<dyn std::error::Error>> {
    match service.get_rank_for_score(score).await {
        -1 => Err("Rank is unavailable".into()),
        rank => {
            println!("A score of {} would rank #{}", score, rank);
            Ok(())
        }
    }
}
