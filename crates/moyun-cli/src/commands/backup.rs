use std::path::Path;

use moyun_core::models::BackupSummary;

use crate::cli::BackupCommands;
use crate::commands::common::{confirm, format_timestamp, open_engine};
use crate::error::CliError;

pub async fn run_backup(
    command: BackupCommands,
    db_path: &Path,
    profile: Option<&str>,
) -> Result<(), CliError> {
    let engine = open_engine(db_path, profile).await?;
    match command {
        BackupCommands::Create { note } => {
            let summary = engine.create_backup(note.trim()).await?;
            println!("Created backup {}", summary.id);
        }
        BackupCommands::List { json } => {
            let backups = engine.list_backups().await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&backups)?);
            } else if backups.is_empty() {
                println!("No backups.");
            } else {
                for line in format_backup_lines(&backups) {
                    println!("{line}");
                }
            }
        }
        BackupCommands::Restore { id, yes } => {
            let prompt = format!(
                "Restore backup {id}? Local and remote documents not in it will be deleted, and queued changes discarded."
            );
            if !yes && !confirm(&prompt)? {
                return Err(CliError::Cancelled);
            }
            let report = engine.restore_backup(id.trim()).await?;
            println!(
                "Restored {} document(s), {} library item(s){}; removed {} orphaned document(s)",
                report.documents,
                report.library_items,
                if report.settings_restored {
                    " and settings"
                } else {
                    ""
                },
                report.orphans_removed
            );
        }
        BackupCommands::Delete { id } => {
            engine.delete_backup(id.trim()).await?;
            println!("Deleted backup {}", id.trim());
        }
        BackupCommands::Prune { days } => {
            let pruned = engine.prune_backups(days).await?;
            println!("Pruned {pruned} backup(s)");
        }
    }
    Ok(())
}

pub fn format_backup_lines(backups: &[BackupSummary]) -> Vec<String> {
    backups
        .iter()
        .map(|backup| {
            if backup.note.is_empty() {
                format!("{:<15}  {}", backup.id, format_timestamp(backup.timestamp))
            } else {
                format!(
                    "{:<15}  {}  {}",
                    backup.id,
                    format_timestamp(backup.timestamp),
                    backup.note
                )
            }
        })
        .collect()
}
