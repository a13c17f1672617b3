//! Checksum command implementation.

use super::read_snapshot;
use std::path::Path;

/// Runs the checksum command.
pub fn run(path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let snapshot = read_snapshot(path)?;
    let checksum = snapshot.checksum()?;

    println!("{}  {}", checksum, path.display());
    println!("  version: {}", snapshot.version);
    println!("  souls:   {}", snapshot.souls);
    Ok(())
}
