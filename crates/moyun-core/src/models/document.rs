//! Document and document index models

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::error::{Error, Result};

/// Length of the index preview, in characters.
const PREVIEW_LEN: usize = 100;

/// Number of leading paragraphs used for the index preview.
const PREVIEW_PARAGRAPHS: usize = 2;

/// One entry of the document index
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentIndexEntry {
    pub id: String,
    #[serde(default)]
    pub title: String,
    /// Last update timestamp (Unix ms)
    #[serde(default)]
    pub last_modified: i64,
    #[serde(default)]
    pub preview_text: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A paragraph of a document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Paragraph {
    #[serde(default)]
    pub content: String,
    /// Role, author tags and other editor-owned fields
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Paragraph {
    #[must_use]
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            extra: Map::new(),
        }
    }
}

/// A full document body
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    /// Bodies written by older clients carry no id; it is filled from the key on load.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub paragraphs: Vec<Paragraph>,
    /// Creation timestamp (Unix ms)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<i64>,
    /// Last update timestamp (Unix ms)
    #[serde(default)]
    pub last_modified: i64,
    /// Narrative configuration (story anchors, style, world setting, characters...)
    #[serde(flatten)]
    pub narrative: Map<String, Value>,
}

impl Document {
    /// Create an empty document stamped with `now_ms`.
    #[must_use]
    pub fn new(title: impl Into<String>, now_ms: i64) -> Self {
        Self {
            id: Uuid::now_v7().to_string(),
            title: title.into(),
            paragraphs: Vec::new(),
            created_at: Some(now_ms),
            last_modified: now_ms,
            narrative: Map::new(),
        }
    }

    /// Decode a stored or downloaded body, filling a missing id from its key.
    pub fn from_value(id: &str, value: Value) -> Result<Self> {
        if !value.is_object() {
            return Err(Error::InvalidInput(format!(
                "document {id} is not a JSON object"
            )));
        }
        let mut document: Self = serde_json::from_value(value)?;
        if document.id.is_empty() {
            document.id = id.to_string();
        } else if document.id != id {
            return Err(Error::InvalidInput(format!(
                "document body id {} does not match {id}",
                document.id
            )));
        }
        Ok(document)
    }

    /// Preview text: the first two paragraphs joined, cut to 100 characters.
    #[must_use]
    pub fn preview_text(&self) -> String {
        self.paragraphs
            .iter()
            .take(PREVIEW_PARAGRAPHS)
            .map(|paragraph| paragraph.content.as_str())
            .collect::<Vec<_>>()
            .join(" ")
            .chars()
            .take(PREVIEW_LEN)
            .collect()
    }

    /// Index entry describing this document.
    #[must_use]
    pub fn index_entry(&self) -> DocumentIndexEntry {
        DocumentIndexEntry {
            id: self.id.clone(),
            title: self.title.clone(),
            last_modified: self.last_modified,
            preview_text: self.preview_text(),
            extra: Map::new(),
        }
    }
}

/// Check that an id can be used both as a cache key suffix and a remote path segment.
pub fn validate_document_id(id: &str) -> Result<()> {
    let id = id.trim();
    if id.is_empty() {
        return Err(Error::InvalidInput("document id must not be empty".into()));
    }
    if id == "index" {
        return Err(Error::InvalidInput(
            "document id 'index' is reserved".into(),
        ));
    }
    if id
        .chars()
        .any(|c| matches!(c, '/' | '.' | '#' | '$' | '[' | ']') || c.is_control())
    {
        return Err(Error::InvalidInput(format!(
            "document id {id} contains a reserved character"
        )));
    }
    Ok(())
}
