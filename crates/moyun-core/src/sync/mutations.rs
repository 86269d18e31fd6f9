//! Local mutations. Each write lands in the cache first; document changes are
//! also queued for replay.

use serde_json::Value;

use super::SyncOrchestrator;
use crate::keys;
use crate::merge::decode_collection;
use crate::models::{
    validate_document_id, ChangeType, Document, DocumentIndexEntry, LibraryItem, Settings,
};
use crate::remote::{paths, RemoteTransport};
use crate::services::CacheBatch;
use crate::Result;

impl<T: RemoteTransport> SyncOrchestrator<T> {
    /// Save a document body and its index entry, stamping `lastModified`.
    pub async fn save_document(&self, mut document: Document) -> Result<Document> {
        validate_document_id(&document.id)?;
        let _index = self.index_lock.lock().await;
        let _document = self.document_locks.lock(&document.id).await;

        let mut index = self.local.load_document_index().await?.entries;
        let change_type = if index.contains(&document.id) {
            ChangeType::Update
        } else {
            ChangeType::Create
        };

        document.last_modified = self.clock.now_ms();
        if document.created_at.is_none() {
            document.created_at = Some(document.last_modified);
        }
        index.insert(document.index_entry());

        let mut batch = CacheBatch::new();
        batch.set_json(keys::document(&document.id), &document)?;
        batch.set_json(keys::DOC_INDEX, &index.sorted_by_recency())?;
        self.local.apply_batch(batch).await?;

        let payload = serde_json::to_value(&document)?;
        self.queue
            .append(&document.id, change_type, &payload)
            .await?;
        Ok(document)
    }

    /// Delete a document locally and queue the remote delete.
    ///
    /// Returns whether the document existed locally.
    pub async fn delete_document(&self, id: &str) -> Result<bool> {
        validate_document_id(id)?;
        let _index = self.index_lock.lock().await;
        let _document = self.document_locks.lock(id).await;

        let mut index = self.local.load_document_index().await?.entries;
        let had_entry = index.remove(id).is_some();

        let mut batch = CacheBatch::new();
        batch.remove(keys::document(id));
        batch.set_json(keys::DOC_INDEX, &index.sorted_by_recency())?;
        self.local.apply_batch(batch).await?;

        self.queue
            .append(id, ChangeType::Delete, &Value::Null)
            .await?;
        tracing::info!("Deleted document {}", id);
        Ok(had_entry)
    }

    /// Load one local document body.
    pub async fn document(&self, id: &str) -> Result<Option<Document>> {
        self.local.load_document(id).await
    }

    /// Save settings, stamping `_lastModified`.
    pub async fn save_settings(&self, mut settings: Settings) -> Result<Settings> {
        let _kind = self.settings_lock.lock().await;
        settings.last_modified = self.clock.now_ms();
        self.local.save_settings(&settings).await?;
        Ok(settings)
    }

    /// Insert or replace a library item, stamping `lastModified`.
    pub async fn save_library_item(&self, mut item: LibraryItem) -> Result<LibraryItem> {
        if item.id.trim().is_empty() {
            return Err(crate::Error::InvalidInput(
                "library item id must not be empty".to_string(),
            ));
        }
        let _kind = self.library_lock.lock().await;

        let mut library = self.local.load_library().await?.items;
        item.last_modified = self.clock.now_ms();
        library.insert(item.clone());
        self.local.save_library(&library).await?;
        Ok(item)
    }

    /// Remove a library item locally and, when reachable, from the remote copy.
    ///
    /// Returns whether the item existed locally.
    pub async fn remove_library_item(&self, id: &str) -> Result<bool> {
        let _kind = self.library_lock.lock().await;

        let mut library = self.local.load_library().await?.items;
        if library.remove(id).is_none() {
            return Ok(false);
        }
        self.local
            .set_json(keys::WORLD_LIBRARY, &library.sorted_by_recency())
            .await?;

        // The library has no delete log; without this the next sync would restore the item
        if self.is_online() && self.remote.is_authenticated() {
            if let Err(error) = self.remove_remote_library_item(id).await {
                tracing::warn!(
                    "Removed library item {} locally but not remotely: {}",
                    id,
                    error
                );
            }
        }
        Ok(true)
    }

    async fn remove_remote_library_item(&self, id: &str) -> Result<()> {
        let value = self.remote.read(paths::WORLD_LIBRARY).await?;
        let mut remote = decode_collection::<LibraryItem>(value.as_ref(), "remote library");
        if remote.collection.remove(id).is_some() || remote.map_shaped {
            self.write_remote_library(&remote.collection).await?;
        }
        Ok(())
    }

    /// Library items newest first.
    pub async fn library(&self) -> Result<Vec<LibraryItem>> {
        Ok(self.local.load_library().await?.items.sorted_by_recency())
    }

    /// Local index entries, newest first.
    pub async fn document_index(&self) -> Result<Vec<DocumentIndexEntry>> {
        Ok(self
            .local
            .load_document_index()
            .await?
            .entries
            .sorted_by_recency())
    }
}
