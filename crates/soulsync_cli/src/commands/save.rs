//! Cloud save command implementations.

use super::{read_snapshot, sign_in, write_json};
use soulsync_engine::{SyncAction, SyncService};
use std::path::Path;
use tracing::info;

/// Uploads a save file as the cloud save.
pub async fn push(service: &SyncService, path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let snapshot = read_snapshot(path)?;
    sign_in(service).await?;

    info!("Uploading {:?} (version {})", path, snapshot.version);
    if service.save_to_cloud(snapshot).await {
        println!("✓ Cloud save updated");
        Ok(())
    } else {
        Err(last_error(service, "Upload failed"))
    }
}

/// Downloads the cloud save.
pub async fn pull(
    service: &SyncService,
    output: Option<&Path>,
) -> Result<(), Box<dyn std::error::Error>> {
    sign_in(service).await?;

    match service.load_from_cloud().await {
        Some(snapshot) => {
            if service.stats().integrity_mismatches > 0 {
                eprintln!("warning: cloud save checksum mismatch");
            }
            write_json(&snapshot, output)
        }
        None if service.stats().read_failures > 0 => Err(last_error(service, "Download failed")),
        None => {
            println!("No cloud save yet");
            Ok(())
        }
    }
}

/// Merges a save file with the cloud save and uploads the result.
pub async fn sync(
    service: &SyncService,
    path: &Path,
    dry_run: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let local = read_snapshot(path)?;
    sign_in(service).await?;

    let result = service.sync_save(local).await;
    match result.action {
        SyncAction::UploadedLocal => println!("No cloud save yet; uploaded local save"),
        SyncAction::Merged => println!("Merged local and cloud saves"),
        SyncAction::LocalOnly => {
            return Err(last_error(service, "Cloud save unreadable; nothing changed"));
        }
    }
    if !result.uploaded {
        eprintln!("warning: merged save was not uploaded");
    }

    if dry_run {
        write_json(&result.snapshot, None)
    } else {
        write_json(&result.snapshot, Some(path))
    }
}

/// Deletes the cloud save.
pub async fn delete(service: &SyncService) -> Result<(), Box<dyn std::error::Error>> {
    sign_in(service).await?;

    if service.delete_cloud_save().await {
        println!("✓ Cloud save deleted");
        Ok(())
    } else {
        Err(last_error(service, "Delete failed"))
    }
}

fn last_error(service: &SyncService, context: &str) -> Box<dyn std::error::Error> {
    match service.stats().last_error {
        Some(error) => format!("{}: {}", context, error).into(),
        None => context.into(),
    }
}
