//! Key/value cache repository implementation

use crate::error::Result;
use libsql::Connection;

/// Trait for raw cache record storage (async)
#[allow(async_fn_in_trait)]
pub trait CacheRepository {
    /// Read the JSON text stored under `key`
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Store JSON text under `key`, replacing any previous value
    async fn set(&self, key: &str, value: &str) -> Result<()>;

    /// Remove `key`, returning whether a record existed
    async fn remove(&self, key: &str) -> Result<bool>;

    /// List keys starting with `prefix`, in key order
    async fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>>;
}

/// libSQL implementation of `CacheRepository`
pub struct LibSqlCacheRepository<'a> {
    conn: &'a Connection,
}

impl<'a> LibSqlCacheRepository<'a> {
    /// Create a new repository with the given connection
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }
}

impl CacheRepository for LibSqlCacheRepository<'_> {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut rows = self
            .conn
            .query("SELECT value FROM kv_cache WHERE key = ?", [key])
            .await?;

        if let Some(row) = rows.next().await? {
            Ok(Some(row.get::<String>(0)?))
        } else {
            Ok(None)
        }
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        let now = chrono::Utc::now().timestamp_millis();
        self.conn
            .execute(
                "INSERT OR REPLACE INTO kv_cache (key, value, updated_at) VALUES (?, ?, ?)",
                libsql::params![key, value, now],
            )
            .await?;
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<bool> {
        let rows = self
            .conn
            .execute("DELETE FROM kv_cache WHERE key = ?", [key])
            .await?;
        Ok(rows > 0)
    }

    async fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>> {
        // substr instead of LIKE: cache keys contain `_`, a LIKE wildcard
        let mut rows = self
            .conn
            .query(
                "SELECT key FROM kv_cache WHERE substr(key, 1, length(?1)) = ?1 ORDER BY key",
                [prefix],
            )
            .await?;

        let mut keys = Vec::new();
        while let Some(row) = rows.next().await? {
            keys.push(row.get::<String>(0)?);
        }
        Ok(keys)
    }
}
