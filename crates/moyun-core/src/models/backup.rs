//! Backup record models

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::{Document, DocumentIndexEntry, LibraryItem, Settings};

/// Full-corpus payload of a backup
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupData {
    #[serde(default)]
    pub document_index: Vec<DocumentIndexEntry>,
    #[serde(default)]
    pub documents: BTreeMap<String, Document>,
    #[serde(default)]
    pub library: Vec<LibraryItem>,
    /// Settings without the secret field
    #[serde(default)]
    pub settings: Option<Settings>,
}

/// An immutable point-in-time snapshot stored remotely
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackupRecord {
    /// Creation timestamp rendered as a string
    pub id: String,
    /// Creation timestamp (Unix ms)
    pub timestamp: i64,
    #[serde(default)]
    pub note: String,
    pub data: BackupData,
}

impl BackupRecord {
    #[must_use]
    pub fn summary(&self) -> BackupSummary {
        BackupSummary {
            id: self.id.clone(),
            timestamp: self.timestamp,
            note: self.note.clone(),
        }
    }
}

/// Listing view of a backup, without its payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupSummary {
    pub id: String,
    pub timestamp: i64,
    #[serde(default)]
    pub note: String,
}
