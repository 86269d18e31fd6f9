//! Per-kind reconciliation passes. Callers hold the matching kind lock.

use serde_json::Value;

use super::{KindOutcome, SyncKind, SyncOrchestrator};
use crate::merge::{decode_collection, reconcile, resolve, EntityCollection, Resolution};
use crate::models::{Document, DocumentIndexEntry, LibraryItem, Settings};
use crate::remote::{paths, RemoteTransport};
use crate::{Error, Result};

impl<T: RemoteTransport> SyncOrchestrator<T> {
    pub(super) fn require_auth(&self) -> Result<()> {
        if self.remote.is_authenticated() {
            Ok(())
        } else {
            Err(Error::NotAuthenticated)
        }
    }

    pub(super) async fn remote_write(&self, path: &str, value: &Value) -> Result<()> {
        if self.remote.write(path, value).await? {
            Ok(())
        } else {
            Err(Error::NotAuthenticated)
        }
    }

    pub(super) async fn remote_delete(&self, path: &str) -> Result<()> {
        if self.remote.delete(path).await? {
            Ok(())
        } else {
            Err(Error::NotAuthenticated)
        }
    }

    /// Read and decode a remote document body; absent or malformed reads as `None`.
    pub(super) async fn fetch_remote_document(&self, id: &str) -> Result<Option<Document>> {
        let Some(value) = self.remote.read(&paths::document(id)).await? else {
            return Ok(None);
        };
        match Document::from_value(id, value) {
            Ok(document) => Ok(Some(document)),
            Err(error) => {
                tracing::warn!("Ignoring malformed remote body of document {}: {}", id, error);
                Ok(None)
            }
        }
    }

    pub(super) async fn settings_pass(&self) -> Result<KindOutcome> {
        self.require_auth()?;
        let mut outcome = KindOutcome::new(SyncKind::Settings);

        let local = self.local.load_settings().await?;
        let remote = match self.remote.read(paths::SETTINGS).await? {
            Some(value) => match Settings::from_remote(value) {
                Ok(settings) => Some(settings),
                Err(error) => {
                    tracing::warn!("Ignoring malformed remote settings: {}", error);
                    outcome.skipped += 1;
                    None
                }
            },
            None => None,
        };

        let resolution = resolve(
            local.as_ref().map(|settings| settings.last_modified),
            remote.as_ref().map(|settings| settings.last_modified),
        );

        match (resolution, local, remote) {
            (Some(Resolution::Upload), Some(local), _) => {
                let value = local.remote_representation()?;
                self.remote_write(paths::SETTINGS, &value).await?;
                outcome.uploads = 1;
                tracing::debug!("Uploaded settings");
            }
            (Some(Resolution::Download), local, Some(remote)) => {
                let secret = local.map(|settings| settings.api_key).unwrap_or_default();
                self.local.save_settings(&remote.with_secret(secret)).await?;
                outcome.downloads = 1;
                tracing::debug!("Downloaded settings");
            }
            _ => {}
        }

        Ok(outcome)
    }

    pub(super) async fn document_index_pass(&self) -> Result<KindOutcome> {
        self.require_auth()?;
        let mut outcome = KindOutcome::new(SyncKind::DocumentIndex);

        let local = self.local.load_document_index().await?;
        let remote_value = self.remote.read(paths::DOC_INDEX).await?;
        let remote =
            decode_collection::<DocumentIndexEntry>(remote_value.as_ref(), "remote index");
        outcome.skipped = local.skipped + remote.skipped;

        let mut remote_entries = remote.collection;
        for id in self.queue.pending_delete_ids().await? {
            if remote_entries.remove(&id).is_some() {
                tracing::debug!("Hiding remote entry {} with a pending local delete", id);
            }
        }

        let plan = reconcile(&local.entries, &remote_entries);
        let mut merged = plan.merged;

        for id in &plan.to_download {
            let _document = self.document_locks.lock(id).await;
            if let Some(document) = self.fetch_remote_document(id).await? {
                self.local.save_document_body(&document).await?;
                self.queue.prune_confirmed(id, document.last_modified).await?;
                outcome.downloads += 1;
                continue;
            }

            tracing::warn!("Remote body of document {} is unusable; keeping local state", id);
            match local.entries.get(id) {
                Some(entry) => {
                    merged.insert(entry.clone());
                }
                None => {
                    merged.remove(id);
                }
            }
        }

        for id in &plan.to_upload {
            let _document = self.document_locks.lock(id).await;
            if let Some(document) = self.local.load_document(id).await? {
                let value = serde_json::to_value(&document)?;
                self.remote_write(&paths::document(id), &value).await?;
                self.queue.prune_confirmed(id, document.last_modified).await?;
                outcome.uploads += 1;
                continue;
            }

            // No local body to send: fall back to the remote copy if there is one
            let replacement = match remote_entries.get(id) {
                Some(entry) => self
                    .fetch_remote_document(id)
                    .await?
                    .map(|document| (entry.clone(), document)),
                None => None,
            };
            match replacement {
                Some((entry, document)) => {
                    tracing::warn!("Local body of document {} is missing; restoring remote copy", id);
                    self.local.save_document_body(&document).await?;
                    merged.insert(entry);
                    outcome.downloads += 1;
                }
                None => {
                    tracing::warn!("Dropping index entry {} with no body on either side", id);
                    merged.remove(id);
                }
            }
        }

        if !self.local.save_document_index(&merged).await? {
            tracing::warn!("Kept non-empty local document index over an empty merge result");
        }

        let both_empty_fresh =
            merged.is_empty() && remote_entries.is_empty() && !local.initialized;
        if outcome.uploads > 0 || remote.map_shaped || both_empty_fresh {
            let value = serde_json::to_value(merged.sorted_by_recency())?;
            self.remote_write(paths::DOC_INDEX, &value).await?;
        }

        Ok(outcome)
    }

    pub(super) async fn library_pass(&self) -> Result<KindOutcome> {
        self.require_auth()?;
        let mut outcome = KindOutcome::new(SyncKind::Library);

        let local = self.local.load_library().await?;
        let remote_value = self.remote.read(paths::WORLD_LIBRARY).await?;
        let remote = decode_collection::<LibraryItem>(remote_value.as_ref(), "remote library");
        outcome.skipped = local.skipped + remote.skipped;

        let plan = reconcile(&local.items, &remote.collection);
        outcome.uploads = plan.to_upload.len();
        outcome.downloads = plan.to_download.len();

        if !self.local.save_library(&plan.merged).await? {
            tracing::warn!("Kept non-empty local library over an empty merge result");
        }

        let both_empty_fresh = plan.merged.is_empty() && !local.initialized;
        if outcome.uploads > 0 || remote.map_shaped || both_empty_fresh {
            self.write_remote_library(&plan.merged).await?;
        }

        Ok(outcome)
    }

    pub(super) async fn write_remote_library(
        &self,
        items: &EntityCollection<LibraryItem>,
    ) -> Result<()> {
        let value = serde_json::to_value(items.sorted_by_recency())?;
        self.remote_write(paths::WORLD_LIBRARY, &value).await
    }
}
