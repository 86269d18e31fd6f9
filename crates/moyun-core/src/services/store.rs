//! Local key/value cache shared across the engine.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::Mutex;

use crate::db::{CacheRepository, Database, LibSqlCacheRepository};
use crate::Result;

/// Set of cache writes applied in one transaction
#[derive(Debug, Clone, Default)]
pub struct CacheBatch {
    removes: Vec<String>,
    sets: Vec<(String, String)>,
}

impl CacheBatch {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a JSON write.
    pub fn set_json<T: Serialize + ?Sized>(&mut self, key: impl Into<String>, value: &T) -> Result<()> {
        self.sets.push((key.into(), serde_json::to_string(value)?));
        Ok(())
    }

    /// Queue a removal. Removals run before writes.
    pub fn remove(&mut self, key: impl Into<String>) {
        self.removes.push(key.into());
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.removes.is_empty() && self.sets.is_empty()
    }
}

/// Thread-safe handle over the on-device cache.
#[derive(Clone)]
pub struct LocalStore {
    db: Arc<Mutex<Database>>,
    db_path: Option<PathBuf>,
}

impl LocalStore {
    /// Open the cache at the given filesystem path.
    ///
    /// A file that is not a database is moved aside and a fresh one created.
    pub async fn open_path(db_path: impl Into<PathBuf>) -> Result<Self> {
        let db_path = db_path.into();
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let db = match Database::open(&db_path).await {
            Ok(db) => db,
            Err(error) if Self::is_corrupted_db_error(&error) => {
                tracing::warn!(
                    "Local cache at {} is unreadable: {}. Moving it aside and starting fresh.",
                    db_path.display(),
                    error
                );
                Self::quarantine_corrupted_db_files(&db_path)?;
                Database::open(&db_path).await?
            }
            Err(error) => return Err(error),
        };

        Ok(Self {
            db: Arc::new(Mutex::new(db)),
            db_path: Some(db_path),
        })
    }

    /// Open an in-memory cache (primarily for tests).
    pub async fn open_in_memory() -> Result<Self> {
        let db = Database::open_in_memory().await?;
        Ok(Self {
            db: Arc::new(Mutex::new(db)),
            db_path: None,
        })
    }

    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.db_path.as_deref()
    }

    pub(crate) fn database(&self) -> Arc<Mutex<Database>> {
        Arc::clone(&self.db)
    }

    fn is_corrupted_db_error(error: &crate::Error) -> bool {
        error
            .to_string()
            .to_ascii_lowercase()
            .contains("file is not a database")
    }

    fn quarantine_corrupted_db_files(db_path: &Path) -> Result<()> {
        if db_path.exists() {
            let timestamp = chrono::Utc::now().timestamp_millis();
            let base_name = db_path
                .file_name()
                .map_or_else(|| "moyun.db".into(), |name| name.to_string_lossy());
            let backup_path = db_path.with_file_name(format!("{base_name}.corrupt-{timestamp}"));

            std::fs::rename(db_path, &backup_path)?;
            tracing::warn!(
                "Moved corrupted local cache from {} to {}",
                db_path.display(),
                backup_path.display()
            );
        }

        let Some(parent) = db_path.parent() else {
            return Ok(());
        };
        let Some(base_name) = db_path.file_name().and_then(|name| name.to_str()) else {
            return Ok(());
        };
        // WAL and shared-memory sidecars of the old file
        let sidecar_prefix = format!("{base_name}-");

        for entry in std::fs::read_dir(parent)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            let file_name = entry.file_name();
            let file_name = file_name.to_string_lossy();
            if file_name.starts_with(&sidecar_prefix) {
                let path = entry.path();
                std::fs::remove_file(&path)?;
                tracing::warn!("Removed stale cache sidecar {}", path.display());
            }
        }

        Ok(())
    }

    /// Read the raw text stored under `key`.
    pub async fn get_raw(&self, key: &str) -> Result<Option<String>> {
        let db = self.db.lock().await;
        let repo = LibSqlCacheRepository::new(db.connection());
        repo.get(key).await
    }

    /// Store raw text under `key`.
    pub async fn set_raw(&self, key: &str, value: &str) -> Result<()> {
        let db = self.db.lock().await;
        let repo = LibSqlCacheRepository::new(db.connection());
        repo.set(key, value).await
    }

    /// Read `key` as JSON; unparseable records read as absent.
    pub async fn get_value(&self, key: &str) -> Result<Option<Value>> {
        let Some(raw) = self.get_raw(key).await? else {
            return Ok(None);
        };
        match serde_json::from_str::<Value>(&raw) {
            Ok(value) => Ok(Some(value)),
            Err(error) => {
                tracing::warn!("Ignoring unparseable cache record {}: {}", key, error);
                Ok(None)
            }
        }
    }

    /// Read `key` as `T`; unparseable or mistyped records read as absent.
    pub async fn get_json<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        let Some(value) = self.get_value(key).await? else {
            return Ok(None);
        };
        match serde_json::from_value(value) {
            Ok(decoded) => Ok(Some(decoded)),
            Err(error) => {
                tracing::warn!("Ignoring malformed cache record {}: {}", key, error);
                Ok(None)
            }
        }
    }

    /// Store `value` as JSON under `key`.
    pub async fn set_json<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<()> {
        let raw = serde_json::to_string(value)?;
        self.set_raw(key, &raw).await
    }

    /// Store a collection, refusing to replace a non-empty one with nothing.
    ///
    /// Returns whether the write happened.
    pub async fn set_collection<T: Serialize>(&self, key: &str, items: &[T]) -> Result<bool> {
        let raw = serde_json::to_string(items)?;
        let db = self.db.lock().await;
        let repo = LibSqlCacheRepository::new(db.connection());

        if items.is_empty() {
            let existing = repo.get(key).await?;
            if existing.as_deref().is_some_and(holds_entries) {
                tracing::warn!(
                    "Refusing to overwrite non-empty {} with an empty collection",
                    key
                );
                return Ok(false);
            }
        }

        repo.set(key, &raw).await?;
        Ok(true)
    }

    /// Remove `key`, returning whether it existed.
    pub async fn remove(&self, key: &str) -> Result<bool> {
        let db = self.db.lock().await;
        let repo = LibSqlCacheRepository::new(db.connection());
        repo.remove(key).await
    }

    /// Keys beginning with `prefix`, in key order.
    pub async fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>> {
        let db = self.db.lock().await;
        let repo = LibSqlCacheRepository::new(db.connection());
        repo.keys_with_prefix(prefix).await
    }

    /// Apply every write of `batch` or none of them.
    pub async fn apply_batch(&self, batch: CacheBatch) -> Result<()> {
        if batch.is_empty() {
            return Ok(());
        }

        let db = self.db.lock().await;
        let conn = db.connection();
        conn.execute("BEGIN IMMEDIATE TRANSACTION", ()).await?;

        let repo = LibSqlCacheRepository::new(conn);
        let outcome: Result<()> = async {
            for key in &batch.removes {
                repo.remove(key).await?;
            }
            for (key, value) in &batch.sets {
                repo.set(key, value).await?;
            }
            Ok(())
        }
        .await;

        match outcome {
            Ok(()) => {
                if let Err(error) = conn.execute("COMMIT", ()).await {
                    conn.execute("ROLLBACK", ()).await.ok();
                    return Err(error.into());
                }
                Ok(())
            }
            Err(error) => {
                conn.execute("ROLLBACK", ()).await.ok();
                Err(error)
            }
        }
    }
}

fn holds_entries(raw: &str) -> bool {
    match serde_json::from_str::<Value>(raw) {
        Ok(Value::Array(items)) => !items.is_empty(),
        Ok(Value::Object(map)) => !map.is_empty(),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use tempfile::tempdir;

    #[tokio::test(flavor = "multi_thread")]
    async fn json_roundtrip_and_unparseable_records() {
        let store = LocalStore::open_in_memory().await.unwrap();

        store.set_json("k", &json!({"a": 1})).await.unwrap();
        assert_eq!(store.get_value("k").await.unwrap(), Some(json!({"a": 1})));

        store.set_raw("broken", "{not json").await.unwrap();
        assert_eq!(store.get_value("broken").await.unwrap(), None);
        assert_eq!(store.get_value("missing").await.unwrap(), None);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn empty_collection_never_replaces_entries() {
        let store = LocalStore::open_in_memory().await.unwrap();

        assert!(store.set_collection::<Value>("list", &[]).await.unwrap());
        assert!(store.set_collection("list", &[json!({"id": "a"})]).await.unwrap());
        assert!(!store.set_collection::<Value>("list", &[]).await.unwrap());
        assert_eq!(
            store.get_value("list").await.unwrap(),
            Some(json!([{"id": "a"}]))
        );
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn empty_guard_also_protects_map_shaped_records() {
        let store = LocalStore::open_in_memory().await.unwrap();
        store.set_json("map", &json!({"a": {"id": "a"}})).await.unwrap();
        assert!(!store.set_collection::<Value>("map", &[]).await.unwrap());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn batch_applies_removes_then_sets() {
        let store = LocalStore::open_in_memory().await.unwrap();
        store.set_json("old", &1).await.unwrap();
        store.set_json("keep", &2).await.unwrap();

        let mut batch = CacheBatch::new();
        batch.remove("old");
        batch.set_json("new", &json!([3])).unwrap();
        store.apply_batch(batch).await.unwrap();

        assert_eq!(store.get_value("old").await.unwrap(), None);
        assert_eq!(store.get_value("keep").await.unwrap(), Some(json!(2)));
        assert_eq!(store.get_value("new").await.unwrap(), Some(json!([3])));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn values_survive_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("moyun.db");

        {
            let store = LocalStore::open_path(&path).await.unwrap();
            store.set_json("k", &json!("v")).await.unwrap();
        }

        let store = LocalStore::open_path(&path).await.unwrap();
        assert_eq!(store.get_value("k").await.unwrap(), Some(json!("v")));
    }

    #[test]
    fn detects_corrupted_database_errors() {
        assert!(LocalStore::is_corrupted_db_error(&crate::Error::Database(
            "SQLite failure: file is not a database".to_string()
        )));
        assert!(!LocalStore::is_corrupted_db_error(&crate::Error::InvalidInput(
            "bad".to_string()
        )));
    }

    #[test]
    fn quarantine_moves_db_and_removes_sidecars() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("moyun.db");
        std::fs::write(&db_path, "not sqlite").unwrap();
        std::fs::write(dir.path().join("moyun.db-wal"), "wal").unwrap();
        std::fs::write(dir.path().join("other.txt"), "keep").unwrap();

        LocalStore::quarantine_corrupted_db_files(&db_path).unwrap();

        assert!(!db_path.exists());
        assert!(!dir.path().join("moyun.db-wal").exists());
        assert!(dir.path().join("other.txt").exists());
        let moved = std::fs::read_dir(dir.path())
            .unwrap()
            .filter_map(std::result::Result::ok)
            .any(|entry| {
                entry
                    .file_name()
                    .to_string_lossy()
                    .starts_with("moyun.db.corrupt-")
            });
        assert!(moved);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn keys_with_prefix_lists_document_bodies() {
        let store = LocalStore::open_in_memory().await.unwrap();
        store.set_json(&crate::keys::document("b"), &json!({})).await.unwrap();
        store.set_json(&crate::keys::document("a"), &json!({})).await.unwrap();
        store.set_json(crate::keys::DOC_INDEX, &json!([])).await.unwrap();

        let keys = store.keys_with_prefix(crate::keys::DOC_PREFIX).await.unwrap();
        assert_eq!(keys, vec!["moyun_doc_a", "moyun_doc_b", "moyun_doc_index"]);
    }
}
