//! Typed access to the cached corpus: index, bodies, library and settings.

use serde_json::Value;

use super::LocalStore;
use crate::keys;
use crate::merge::{decode_collection, EntityCollection};
use crate::models::{Document, DocumentIndexEntry, LibraryItem, Settings};
use crate::Result;

/// Locally cached document index
#[derive(Debug, Clone, PartialEq)]
pub struct LocalIndex {
    pub entries: EntityCollection<DocumentIndexEntry>,
    /// Whether an index record exists at all
    pub initialized: bool,
    pub skipped: usize,
}

/// Locally cached world library
#[derive(Debug, Clone, PartialEq)]
pub struct LocalLibrary {
    pub items: EntityCollection<LibraryItem>,
    pub initialized: bool,
    pub skipped: usize,
}

impl LocalStore {
    /// Load the document index, rewriting a map-shaped record as a list.
    pub async fn load_document_index(&self) -> Result<LocalIndex> {
        let value = self.get_value(keys::DOC_INDEX).await?;
        let initialized = value.is_some();
        let decoded = decode_collection::<DocumentIndexEntry>(value.as_ref(), "local index");

        if decoded.map_shaped {
            tracing::info!("Normalizing map-shaped local document index into a list");
            self.save_document_index(&decoded.collection).await?;
        }

        Ok(LocalIndex {
            entries: decoded.collection,
            initialized,
            skipped: decoded.skipped,
        })
    }

    /// Persist the index newest first. Returns `false` if the empty guard refused it.
    pub async fn save_document_index(
        &self,
        entries: &EntityCollection<DocumentIndexEntry>,
    ) -> Result<bool> {
        self.set_collection(keys::DOC_INDEX, &entries.sorted_by_recency())
            .await
    }

    /// Load one document body; malformed bodies read as absent.
    pub async fn load_document(&self, id: &str) -> Result<Option<Document>> {
        let Some(value) = self.get_value(&keys::document(id)).await? else {
            return Ok(None);
        };
        match Document::from_value(id, value) {
            Ok(document) => Ok(Some(document)),
            Err(error) => {
                tracing::warn!("Ignoring malformed local body of document {}: {}", id, error);
                Ok(None)
            }
        }
    }

    pub async fn save_document_body(&self, document: &Document) -> Result<()> {
        self.set_json(&keys::document(&document.id), document).await
    }

    pub async fn remove_document_body(&self, id: &str) -> Result<bool> {
        self.remove(&keys::document(id)).await
    }

    /// Ids of every cached document body.
    pub async fn document_body_ids(&self) -> Result<Vec<String>> {
        let keys = self.keys_with_prefix(keys::DOC_PREFIX).await?;
        Ok(keys
            .iter()
            .filter_map(|key| keys::document_id(key))
            .map(ToString::to_string)
            .collect())
    }

    pub async fn load_library(&self) -> Result<LocalLibrary> {
        let value = self.get_value(keys::WORLD_LIBRARY).await?;
        let initialized = value.is_some();
        let decoded = decode_collection::<LibraryItem>(value.as_ref(), "local library");

        if decoded.map_shaped {
            self.save_library(&decoded.collection).await?;
        }

        Ok(LocalLibrary {
            items: decoded.collection,
            initialized,
            skipped: decoded.skipped,
        })
    }

    pub async fn save_library(&self, items: &EntityCollection<LibraryItem>) -> Result<bool> {
        self.set_collection(keys::WORLD_LIBRARY, &items.sorted_by_recency())
            .await
    }

    pub async fn load_settings(&self) -> Result<Option<Settings>> {
        let value = self.get_value(keys::GLOBAL_SETTINGS).await?;
        Ok(value.and_then(|value| match value {
            Value::Object(_) => match serde_json::from_value::<Settings>(value) {
                Ok(settings) => Some(settings),
                Err(error) => {
                    tracing::warn!("Ignoring malformed local settings: {}", error);
                    None
                }
            },
            _ => {
                tracing::warn!("Ignoring local settings that are not an object");
                None
            }
        }))
    }

    pub async fn save_settings(&self, settings: &Settings) -> Result<()> {
        self.set_json(keys::GLOBAL_SETTINGS, settings).await
    }

    /// Secret currently held on this device, empty if none.
    pub async fn local_secret(&self) -> Result<String> {
        Ok(self
            .load_settings()
            .await?
            .map(|settings| settings.api_key)
            .unwrap_or_default())
    }
}
