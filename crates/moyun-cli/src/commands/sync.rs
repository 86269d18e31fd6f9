use std::path::Path;
use std::sync::Arc;

use chrono::Utc;
use moyun_core::clock::SystemClock;
use moyun_core::models::PendingChange;
use moyun_core::services::PendingChangeQueue;
use moyun_core::sync::{DrainReport, SyncSummary};

use crate::commands::common::{format_relative_time, open_engine, open_local_store};
use crate::error::CliError;

pub async fn run_sync(as_json: bool, db_path: &Path, profile: Option<&str>) -> Result<(), CliError> {
    let engine = open_engine(db_path, profile).await?;
    let summary = engine.sync_all().await;

    if as_json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        for line in format_summary_lines(&summary) {
            println!("{line}");
        }
    }

    if summary.is_success() {
        Ok(())
    } else {
        Err(CliError::Incomplete("Sync finished with failures".to_string()))
    }
}

pub async fn run_drain(as_json: bool, db_path: &Path, profile: Option<&str>) -> Result<(), CliError> {
    let engine = open_engine(db_path, profile).await?;
    let report = engine.drain().await;

    if as_json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        for line in format_drain_lines(&report) {
            println!("{line}");
        }
    }

    if report.success {
        Ok(())
    } else {
        Err(CliError::Incomplete(format!(
            "{} queued change(s) still pending",
            report.failed.len()
        )))
    }
}

/// List queued changes without touching the remote store.
pub async fn run_pending(
    as_json: bool,
    discard: bool,
    db_path: &Path,
    profile: Option<&str>,
) -> Result<(), CliError> {
    if discard {
        let engine = open_engine(db_path, profile).await?;
        let discarded = engine.discard_pending().await?;
        println!("Discarded {discarded} queued change(s)");
        return Ok(());
    }

    let local = open_local_store(db_path).await?;
    let queue = PendingChangeQueue::new(&local, Arc::new(SystemClock::new()));
    let changes = queue.list().await?;

    if as_json {
        println!("{}", serde_json::to_string_pretty(&changes)?);
    } else if changes.is_empty() {
        println!("No queued changes.");
    } else {
        for line in format_pending_lines(&changes, Utc::now().timestamp_millis()) {
            println!("{line}");
        }
    }
    Ok(())
}

pub fn format_summary_lines(summary: &SyncSummary) -> Vec<String> {
    if !summary.ran {
        return vec!["Not signed in; nothing synced.".to_string()];
    }

    summary
        .outcomes
        .iter()
        .map(|outcome| match &outcome.failure {
            Some(reason) => format!("{:<10} failed: {reason}", outcome.kind),
            None => format!(
                "{:<10} {} uploaded, {} downloaded{}",
                outcome.kind,
                outcome.uploads,
                outcome.downloads,
                if outcome.skipped > 0 {
                    format!(", {} malformed skipped", outcome.skipped)
                } else {
                    String::new()
                }
            ),
        })
        .collect()
}

pub fn format_drain_lines(report: &DrainReport) -> Vec<String> {
    if let Some(reason) = &report.reason {
        return vec![format!("Queue not drained: {reason}")];
    }

    let mut lines = vec![format!("Replayed {} queued change(s)", report.count)];
    lines.extend(report.failed.iter().map(|failed| {
        format!(
            "  #{} {} {}: {}",
            failed.change.id, failed.change.change_type, failed.change.entity_id, failed.reason
        )
    }));
    lines
}

pub fn format_pending_lines(changes: &[PendingChange], now_ms: i64) -> Vec<String> {
    changes
        .iter()
        .map(|change| {
            format!(
                "#{:<5} {:<6}  {:<13}  {}",
                change.id,
                change.change_type,
                change.entity_id.chars().take(13).collect::<String>(),
                format_relative_time(change.timestamp, now_ms)
            )
        })
        .collect()
}
