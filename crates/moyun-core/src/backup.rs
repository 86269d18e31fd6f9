//! Point-in-time backups of the whole corpus.
//!
//! A backup is written to `backups/{id}` first and then summarized under
//! `backupIndex/{id}`; listing reads only the summaries, so a backup whose
//! upload was interrupted never shows up.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use serde_json::Value;

use crate::clock::Clock;
use crate::keys;
use crate::merge::EntityCollection;
use crate::models::{
    validate_document_id, BackupData, BackupRecord, BackupSummary, DocumentIndexEntry, LibraryItem,
    Settings,
};
use crate::remote::{paths, RemoteStore, RemoteTransport};
use crate::services::{CacheBatch, KeyedLocks, LocalStore};
use crate::util::DAY_MS;
use crate::{Error, Result};

/// What a restore put back
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestoreReport {
    pub backup_id: String,
    pub documents: usize,
    pub library_items: usize,
    pub settings_restored: bool,
    /// Remote bodies removed because the backup does not contain them
    pub orphans_removed: usize,
}

/// Result of an automatic backup attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AutoBackup {
    /// Signed out; nothing was attempted
    Skipped,
    /// The previous automatic backup is still recent
    NotDue { next_at: i64 },
    Created { summary: BackupSummary, pruned: usize },
}

pub struct BackupManager<T> {
    local: LocalStore,
    remote: RemoteStore<T>,
    clock: Arc<dyn Clock>,
    locks: KeyedLocks,
}

impl<T: RemoteTransport> BackupManager<T> {
    pub fn new(local: LocalStore, remote: RemoteStore<T>, clock: Arc<dyn Clock>) -> Self {
        Self {
            local,
            remote,
            clock,
            locks: KeyedLocks::new(),
        }
    }

    fn require_auth(&self) -> Result<()> {
        if self.remote.is_authenticated() {
            Ok(())
        } else {
            Err(Error::NotAuthenticated)
        }
    }

    async fn write(&self, path: &str, value: &Value) -> Result<()> {
        if self.remote.write(path, value).await? {
            Ok(())
        } else {
            Err(Error::NotAuthenticated)
        }
    }

    async fn delete_path(&self, path: &str) -> Result<()> {
        if self.remote.delete(path).await? {
            Ok(())
        } else {
            Err(Error::NotAuthenticated)
        }
    }

    /// Snapshot the local corpus into a new remote backup.
    pub async fn create(&self, note: &str) -> Result<BackupSummary> {
        self.require_auth()?;
        let data = self.snapshot().await?;

        let mut timestamp = self.clock.now_ms();
        while self
            .remote
            .read(&paths::backup_summary(&timestamp.to_string()))
            .await?
            .is_some()
        {
            timestamp += 1;
        }

        let record = BackupRecord {
            id: timestamp.to_string(),
            timestamp,
            note: note.trim().to_string(),
            data,
        };
        let _backup = self.locks.lock(&record.id).await;

        self.write(&paths::backup(&record.id), &serde_json::to_value(&record)?)
            .await?;
        let summary = record.summary();
        self.write(
            &paths::backup_summary(&record.id),
            &serde_json::to_value(&summary)?,
        )
        .await?;

        tracing::info!(
            "Created backup {} with {} documents",
            record.id,
            record.data.documents.len()
        );
        Ok(summary)
    }

    async fn snapshot(&self) -> Result<BackupData> {
        let index = self.local.load_document_index().await?.entries;

        let mut document_index = Vec::with_capacity(index.len());
        let mut documents = BTreeMap::new();
        for entry in index.sorted_by_recency() {
            match self.local.load_document(&entry.id).await? {
                Some(document) => {
                    documents.insert(entry.id.clone(), document);
                    document_index.push(entry);
                }
                None => {
                    tracing::warn!("Leaving document {} out of the backup: no local body", entry.id);
                }
            }
        }

        let library = self.local.load_library().await?.items.sorted_by_recency();
        let settings = match self.local.load_settings().await? {
            Some(settings) => Some(Settings::from_remote(settings.remote_representation()?)?),
            None => None,
        };

        Ok(BackupData {
            document_index,
            documents,
            library,
            settings,
        })
    }

    /// Backup summaries, newest first.
    pub async fn list(&self) -> Result<Vec<BackupSummary>> {
        let Some(value) = self.remote.read(paths::BACKUP_INDEX).await? else {
            return Ok(Vec::new());
        };

        let entries: Vec<Value> = match value {
            Value::Object(map) => map.into_iter().map(|(_, entry)| entry).collect(),
            Value::Array(items) => items.into_iter().filter(|item| !item.is_null()).collect(),
            other => {
                tracing::warn!("Ignoring backup index that is neither a map nor a list: {}", other);
                Vec::new()
            }
        };

        let mut summaries: Vec<BackupSummary> = entries
            .into_iter()
            .filter_map(|entry| match serde_json::from_value::<BackupSummary>(entry) {
                Ok(summary) => Some(summary),
                Err(error) => {
                    tracing::warn!("Skipping malformed backup summary: {}", error);
                    None
                }
            })
            .collect();
        summaries.sort_by(|a, b| b.timestamp.cmp(&a.timestamp).then_with(|| a.id.cmp(&b.id)));
        Ok(summaries)
    }

    /// Download and validate a full backup record.
    pub async fn fetch(&self, id: &str) -> Result<BackupRecord> {
        self.require_auth()?;
        let Some(value) = self.remote.read(&paths::backup(id)).await? else {
            return Err(Error::MalformedBackup(format!("backup {id} does not exist")));
        };

        let mut record: BackupRecord = serde_json::from_value(value)
            .map_err(|error| Error::MalformedBackup(format!("backup {id} is unreadable: {error}")))?;
        validate_record(&mut record)?;
        Ok(record)
    }

    /// Replace all local state with a backup and push it back to the remote store.
    ///
    /// Nothing local changes unless the backup downloads and validates. The
    /// caller is expected to hold the sync exclusive guard.
    pub async fn restore(&self, id: &str) -> Result<RestoreReport> {
        let _backup = self.locks.lock(id).await;
        let record = self.fetch(id).await?;
        let data = record.data;

        let previous_remote_ids: BTreeSet<String> = self
            .remote
            .read(paths::DOC_INDEX)
            .await?
            .map(|value| {
                crate::merge::decode_collection::<DocumentIndexEntry>(Some(&value), "remote index")
                    .collection
                    .ids()
                    .map(ToString::to_string)
                    .collect()
            })
            .unwrap_or_default();
        let previous_local_ids = self.local.document_body_ids().await?;

        // A backup without settings resets them, stamped now so the reset wins remotely
        let secret = self.local.local_secret().await?;
        let settings = data
            .settings
            .clone()
            .unwrap_or_else(|| Settings {
                last_modified: self.clock.now_ms(),
                ..Settings::default()
            })
            .with_secret(secret);

        let mut batch = CacheBatch::new();
        for previous in &previous_local_ids {
            batch.remove(keys::document(previous));
        }
        for document in data.documents.values() {
            batch.set_json(keys::document(&document.id), document)?;
        }
        batch.set_json(keys::DOC_INDEX, &data.document_index)?;
        batch.set_json(keys::WORLD_LIBRARY, &data.library)?;
        batch.set_json(keys::GLOBAL_SETTINGS, &settings)?;
        self.local.apply_batch(batch).await?;
        tracing::info!("Restored backup {} locally", id);

        for document in data.documents.values() {
            self.write(
                &paths::document(&document.id),
                &serde_json::to_value(document)?,
            )
            .await?;
        }

        let mut orphans_removed = 0;
        let orphans: BTreeSet<&String> = previous_remote_ids
            .iter()
            .chain(previous_local_ids.iter())
            .filter(|previous| !data.documents.contains_key(*previous))
            .collect();
        for orphan in orphans {
            self.delete_path(&paths::document(orphan)).await?;
            orphans_removed += 1;
        }

        self.write(paths::DOC_INDEX, &serde_json::to_value(&data.document_index)?)
            .await?;
        self.write(paths::WORLD_LIBRARY, &serde_json::to_value(&data.library)?)
            .await?;
        self.write(paths::SETTINGS, &settings.remote_representation()?)
            .await?;

        tracing::info!("Re-uploaded backup {} to the remote store", id);
        Ok(RestoreReport {
            backup_id: id.to_string(),
            documents: data.documents.len(),
            library_items: data.library.len(),
            settings_restored: data.settings.is_some(),
            orphans_removed,
        })
    }

    /// Delete a backup; the summary goes first so it disappears from listings.
    pub async fn delete(&self, id: &str) -> Result<()> {
        self.require_auth()?;
        paths::validate_segment(id)?;
        let _backup = self.locks.lock(id).await;

        self.delete_path(&paths::backup_summary(id)).await?;
        self.delete_path(&paths::backup(id)).await?;
        tracing::info!("Deleted backup {}", id);
        Ok(())
    }

    /// Delete every backup older than `max_age_days`; returns how many went.
    ///
    /// Individual failures are logged and skipped.
    pub async fn prune(&self, max_age_days: u32) -> Result<usize> {
        self.require_auth()?;
        let cutoff = self.clock.now_ms() - i64::from(max_age_days) * DAY_MS;

        let mut deleted = 0;
        for summary in self.list().await? {
            if summary.timestamp >= cutoff {
                continue;
            }
            match self.delete(&summary.id).await {
                Ok(()) => deleted += 1,
                Err(error) => {
                    tracing::warn!("Failed to prune backup {}: {}", summary.id, error);
                }
            }
        }

        if deleted > 0 {
            tracing::info!("Pruned {} backups older than {} days", deleted, max_age_days);
        }
        Ok(deleted)
    }

    /// Create a backup if none was made automatically within `interval_ms`,
    /// then prune backups older than `retention_days`.
    pub async fn run_auto_backup(&self, interval_ms: i64, retention_days: u32) -> Result<AutoBackup> {
        if !self.remote.is_authenticated() {
            return Ok(AutoBackup::Skipped);
        }

        let now = self.clock.now_ms();
        if let Some(last) = self.local.get_json::<i64>(keys::LAST_AUTO_BACKUP).await? {
            let next_at = last.saturating_add(interval_ms);
            if now < next_at {
                tracing::debug!("Auto backup not due until {}", next_at);
                return Ok(AutoBackup::NotDue { next_at });
            }
        }

        let summary = self.create("Auto backup").await?;
        self.local.set_json(keys::LAST_AUTO_BACKUP, &now).await?;

        let pruned = match self.prune(retention_days).await {
            Ok(pruned) => pruned,
            Err(error) => {
                tracing::warn!("Auto backup created but pruning failed: {}", error);
                0
            }
        };
        Ok(AutoBackup::Created { summary, pruned })
    }
}

/// Make a downloaded record self-consistent or reject it.
fn validate_record(record: &mut BackupRecord) -> Result<()> {
    let id = record.id.clone();
    let malformed = |reason: String| Error::MalformedBackup(format!("backup {id}: {reason}"));

    let mut documents = BTreeMap::new();
    for (key, mut document) in std::mem::take(&mut record.data.documents) {
        validate_document_id(&key).map_err(|error| malformed(error.to_string()))?;
        if document.id.is_empty() {
            document.id.clone_from(&key);
        } else if document.id != key {
            return Err(malformed(format!(
                "document stored under {key} claims id {}",
                document.id
            )));
        }
        documents.insert(key, document);
    }

    let mut index: EntityCollection<DocumentIndexEntry> =
        std::mem::take(&mut record.data.document_index)
            .into_iter()
            .filter(|entry| {
                let keep = documents.contains_key(&entry.id);
                if !keep {
                    tracing::warn!("Backup {} lists document {} without a body", id, entry.id);
                }
                keep
            })
            .collect();
    for document in documents.values() {
        if !index.contains(&document.id) {
            index.insert(document.index_entry());
        }
    }

    let library: EntityCollection<LibraryItem> = std::mem::take(&mut record.data.library)
        .into_iter()
        .filter(|item| !item.id.trim().is_empty())
        .collect();

    record.data.document_index = index.sorted_by_recency();
    record.data.documents = documents;
    record.data.library = library.sorted_by_recency();
    if let Some(settings) = record.data.settings.as_mut() {
        settings.api_key.clear();
    }
    Ok(())
}
