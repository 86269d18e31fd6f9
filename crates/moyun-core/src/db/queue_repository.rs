//! Pending-change repository implementation

use crate::error::Result;
use crate::models::{ChangeType, PendingChange};
use libsql::Connection;
use serde_json::Value;

/// Trait for durable pending-change storage (async)
#[allow(async_fn_in_trait)]
pub trait PendingChangeRepository {
    /// Append a change and return its queue-assigned id
    async fn append(
        &self,
        entity_id: &str,
        change_type: ChangeType,
        payload: &Value,
        timestamp: i64,
    ) -> Result<i64>;

    /// List changes in insertion order
    async fn list(&self) -> Result<Vec<PendingChange>>;

    /// Remove a change, returning whether it existed
    async fn remove(&self, id: i64) -> Result<bool>;

    /// Number of queued changes
    async fn count(&self) -> Result<usize>;

    /// Remove every queued change, returning how many were dropped
    async fn clear(&self) -> Result<usize>;
}

/// libSQL implementation of `PendingChangeRepository`
pub struct LibSqlPendingChangeRepository<'a> {
    conn: &'a Connection,
}

impl<'a> LibSqlPendingChangeRepository<'a> {
    /// Create a new repository with the given connection
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// Parse a pending change from a database row
    fn parse_change(row: &libsql::Row) -> Result<PendingChange> {
        let id: i64 = row.get(0)?;
        let entity_id: String = row.get(1)?;
        let change_type: String = row.get(2)?;
        let payload: String = row.get(3)?;
        let timestamp: i64 = row.get(4)?;

        let change_type = change_type.parse::<ChangeType>().unwrap_or_else(|_| {
            tracing::warn!("Pending change {} has unknown type {:?}", id, change_type);
            ChangeType::Unknown
        });

        // An unreadable payload is kept as null so replay reports it as corrupt
        let payload = serde_json::from_str(&payload).unwrap_or_else(|error| {
            tracing::warn!("Pending change {} has an unreadable payload: {}", id, error);
            Value::Null
        });

        Ok(PendingChange {
            id,
            entity_id,
            change_type,
            payload,
            timestamp,
        })
    }
}

impl PendingChangeRepository for LibSqlPendingChangeRepository<'_> {
    async fn append(
        &self,
        entity_id: &str,
        change_type: ChangeType,
        payload: &Value,
        timestamp: i64,
    ) -> Result<i64> {
        let payload = serde_json::to_string(payload)?;
        let mut rows = self
            .conn
            .query(
                "INSERT INTO pending_changes (entity_id, change_type, payload, timestamp)
                 VALUES (?, ?, ?, ?)
                 RETURNING id",
                libsql::params![entity_id, change_type.as_str(), payload, timestamp],
            )
            .await?;

        let row = rows.next().await?.ok_or_else(|| {
            crate::Error::Database("pending change insert returned no id".to_string())
        })?;
        Ok(row.get::<i64>(0)?)
    }

    async fn list(&self) -> Result<Vec<PendingChange>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, entity_id, change_type, payload, timestamp
                 FROM pending_changes
                 ORDER BY id ASC",
                (),
            )
            .await?;

        let mut changes = Vec::new();
        while let Some(row) = rows.next().await? {
            changes.push(Self::parse_change(&row)?);
        }
        Ok(changes)
    }

    async fn remove(&self, id: i64) -> Result<bool> {
        let rows = self
            .conn
            .execute(
                "DELETE FROM pending_changes WHERE id = ?",
                libsql::params![id],
            )
            .await?;
        Ok(rows > 0)
    }

    async fn count(&self) -> Result<usize> {
        let mut rows = self
            .conn
            .query("SELECT COUNT(*) FROM pending_changes", ())
            .await?;

        let count: i64 = if let Some(row) = rows.next().await? {
            row.get(0)?
        } else {
            0
        };
        Ok(usize::try_from(count).unwrap_or_default())
    }

    async fn clear(&self) -> Result<usize> {
        let rows = self.conn.execute("DELETE FROM pending_changes", ()).await?;
        Ok(usize::try_from(rows).unwrap_or(usize::MAX))
    }
}
