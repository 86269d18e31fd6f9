//! Entity collections and tolerant decoding

use std::collections::BTreeMap;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::models::{validate_document_id, DocumentIndexEntry, LibraryItem};

/// A mergeable record identified by `id` and ordered by `last_modified`
pub trait Entity: Clone + Serialize + DeserializeOwned {
    /// Human-readable kind used in log lines
    const KIND: &'static str;

    fn id(&self) -> &str;

    fn last_modified(&self) -> i64;

    /// Reject ids this kind cannot be stored under.
    fn check_id(_id: &str) -> std::result::Result<(), String> {
        Ok(())
    }
}

impl Entity for DocumentIndexEntry {
    const KIND: &'static str = "document";

    fn id(&self) -> &str {
        &self.id
    }

    fn last_modified(&self) -> i64 {
        self.last_modified
    }

    /// Document ids double as remote path segments.
    fn check_id(id: &str) -> std::result::Result<(), String> {
        validate_document_id(id).map_err(|error| error.to_string())
    }
}

impl Entity for LibraryItem {
    const KIND: &'static str = "library item";

    fn id(&self) -> &str {
        &self.id
    }

    fn last_modified(&self) -> i64 {
        self.last_modified
    }
}

/// Entities keyed by id; at most one entry per id
#[derive(Debug, Clone, PartialEq)]
pub struct EntityCollection<T> {
    items: BTreeMap<String, T>,
}

impl<T> Default for EntityCollection<T> {
    fn default() -> Self {
        Self {
            items: BTreeMap::new(),
        }
    }
}

impl<T: Entity> EntityCollection<T> {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an entity, replacing any entry with the same id.
    pub fn insert(&mut self, entity: T) -> Option<T> {
        self.items.insert(entity.id().to_string(), entity)
    }

    /// Insert an entity unless an entry with a newer-or-equal timestamp exists.
    ///
    /// Returns whether the entity was stored.
    pub fn insert_if_newer(&mut self, entity: T) -> bool {
        match self.items.get(entity.id()) {
            Some(existing) if existing.last_modified() >= entity.last_modified() => false,
            _ => {
                self.insert(entity);
                true
            }
        }
    }

    #[must_use]
    pub fn get(&self, id: &str) -> Option<&T> {
        self.items.get(id)
    }

    pub fn remove(&mut self, id: &str) -> Option<T> {
        self.items.remove(id)
    }

    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.items.contains_key(id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Ids in ascending order
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.items.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.items.values()
    }

    /// Entries ordered newest first; ties fall back to id order.
    #[must_use]
    pub fn sorted_by_recency(&self) -> Vec<T> {
        let mut entries: Vec<T> = self.items.values().cloned().collect();
        entries.sort_by(|a, b| {
            b.last_modified()
                .cmp(&a.last_modified())
                .then_with(|| a.id().cmp(b.id()))
        });
        entries
    }
}

impl<T: Entity> FromIterator<T> for EntityCollection<T> {
    /// Duplicate ids keep the entry with the greater timestamp.
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        let mut collection = Self::new();
        for entity in iter {
            collection.insert_if_newer(entity);
        }
        collection
    }
}

/// Outcome of decoding a stored collection
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedCollection<T> {
    pub collection: EntityCollection<T>,
    /// Entries dropped because they were malformed
    pub skipped: usize,
    /// Whether the stored value was an id-keyed map rather than a list
    pub map_shaped: bool,
}

/// Decode a stored collection, tolerating every shape a remote store has produced.
///
/// Accepts a list, an id-keyed map, or nothing. Entries that are not objects,
/// lack a usable `id`, or fail to deserialize are skipped with a warning.
#[must_use]
pub fn decode_collection<T: Entity>(value: Option<&Value>, source: &str) -> DecodedCollection<T> {
    let mut decoded = DecodedCollection {
        collection: EntityCollection::new(),
        skipped: 0,
        map_shaped: false,
    };

    let entries: Vec<&Value> = match value {
        None | Some(Value::Null) => return decoded,
        Some(Value::Array(items)) => items.iter().collect(),
        Some(Value::Object(map)) => {
            decoded.map_shaped = true;
            map.values().collect()
        }
        Some(other) => {
            tracing::warn!(
                "Ignoring {} collection from {}: expected a list or map, found {}",
                T::KIND,
                source,
                json_kind(other)
            );
            decoded.skipped = 1;
            return decoded;
        }
    };

    for entry in entries {
        match decode_entry::<T>(entry) {
            Ok(entity) => {
                decoded.collection.insert_if_newer(entity);
            }
            Err(reason) => {
                tracing::warn!("Skipping malformed {} from {}: {}", T::KIND, source, reason);
                decoded.skipped += 1;
            }
        }
    }

    decoded
}

fn decode_entry<T: Entity>(entry: &Value) -> std::result::Result<T, String> {
    let Some(object) = entry.as_object() else {
        return Err(format!("expected an object, found {}", json_kind(entry)));
    };

    match object.get("id") {
        Some(Value::String(id)) if !id.trim().is_empty() => T::check_id(id)?,
        Some(_) => return Err("id is not a non-empty string".to_string()),
        None => return Err("missing id".to_string()),
    }

    serde_json::from_value(entry.clone()).map_err(|error| error.to_string())
}

const fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a list",
        Value::Object(_) => "an object",
    }
}
