//! World library model

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// A reusable world description shared by all documents
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LibraryItem {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub content: String,
    /// Last update timestamp (Unix ms)
    #[serde(default)]
    pub last_modified: i64,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl LibraryItem {
    #[must_use]
    pub fn new(name: impl Into<String>, content: impl Into<String>, now_ms: i64) -> Self {
        Self {
            id: Uuid::now_v7().to_string(),
            name: name.into(),
            content: content.into(),
            last_modified: now_ms,
            extra: Map::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn missing_timestamp_defaults_to_zero() {
        let item: LibraryItem =
            serde_json::from_value(json!({"id": "w1", "name": "Harbor"})).unwrap();
        assert_eq!(item.last_modified, 0);
        assert_eq!(item.content, "");
    }
}
