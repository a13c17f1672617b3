//! SoulSync CLI
//!
//! Command-line tools for SoulSync save files and the cloud backend.
//!
//! # Commands
//!
//! - `checksum` - Print the fingerprint of a save file
//! - `verify` - Check a save file against a stored checksum
//! - `merge` - Merge two save files offline
//! - `leaderboard` / `rank` - Read the global leaderboard
//! - `push` / `pull` / `sync` / `delete` - Manage the cloud save
//!
//! Online commands read `SOULSYNC_URL` and `SOULSYNC_API_KEY` from the
//! environment or a `.env` file.

mod commands;

use clap::{Parser, Subcommand};
use soulsync_protocol::TimeFilter;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// SoulSync cloud save tools.
#[derive(Parser)]
#[command(name = "soulsync")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Where to keep the anonymous session between runs
    #[arg(global = true, short, long)]
    session: Option<PathBuf>,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the fingerprint of a save file
    Checksum {
        /// Save file (JSON snapshot)
        file: PathBuf,
    },

    /// Check a save file against a stored checksum
    Verify {
        /// Save file (JSON snapshot or exported cloud save row)
        file: PathBuf,

        /// Expected checksum; defaults to the row's stored checksum
        #[arg(short, long)]
        expected: Option<String>,
    },

    /// Merge two save files without touching the network
    Merge {
        /// Local save file
        local: PathBuf,

        /// Remote save file
        remote: PathBuf,

        /// Write the merged save here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Show the top scores
    Leaderboard {
        /// Maximum number of rows
        #[arg(short, long, default_value = "10")]
        limit: usize,

        /// Time window (all, weekly, daily)
        #[arg(short, long, default_value = "all")]
        filter: TimeFilter,

        /// Output format (text, json)
        #[arg(long, default_value = "text")]
        format: String,
    },

    /// Show the rank a score would take
    Rank {
        /// Score to rank
        score: u64,
    },

    /// Upload a save file as the cloud save
    Push {
        /// Save file to upload
        file: PathBuf,
    },

    /// Download the cloud save
    Pull {
        /// Write the save here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Merge a save file with the cloud save and upload the result
    Sync {
        /// Local save file; rewritten with the merged save
        file: PathBuf,

        /// Leave the local file untouched
        #[arg(long)]
        dry_run: bool,
    },

    /// Delete the cloud save
    Delete,

    /// Show version information
    Version,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let session = cli.session;
    match cli.command {
        Commands::Checksum { file } => commands::checksum::run(&file)?,
        Commands::Verify { file, expected } => {
            commands::verify::run(&file, expected.as_deref())?;
        }
        Commands::Merge {
            local,
            remote,
            output,
        } => commands::merge::run(&local, &remote, output.as_deref())?,
        Commands::Leaderboard {
            limit,
            filter,
            format,
        } => {
            let service = commands::connect(session)?;
            commands::leaderboard::run(&service, limit, filter, &format).await?;
        }
        Commands::Rank { score } => {
            let service = commands::connect(session)?;
            commands::leaderboard::rank(&service, score).await?;
        }
        Commands::Push { file } => {
            let service = commands::connect(session)?;
            commands::save::push(&service, &file).await?;
        }
        Commands::Pull { output } => {
            let service = commands::connect(session)?;
            commands::save::pull(&service, output.as_deref()).await?;
        }
        Commands::Sync { file, dry_run } => {
            let service = commands::connect(session)?;
            commands::save::sync(&service, &file, dry_run).await?;
        }
        Commands::Delete => {
            let service = commands::connect(session)?;
            commands::save::delete(&service).await?;
        }
        Commands::Version => {
            println!("SoulSync CLI v{}", env!("CARGO_PKG_VERSION"));
        }
    }

    Ok(())
}
