//! Durable pending-change queue.

use std::sync::Arc;

use serde_json::Value;
use tokio::sync::Mutex;

use super::LocalStore;
use crate::clock::Clock;
use crate::db::{Database, LibSqlPendingChangeRepository, PendingChangeRepository};
use crate::models::{ChangeType, PendingChange};
use crate::Result;

/// Ordered log of document mutations awaiting remote confirmation.
///
/// Shares the database file of the [`LocalStore`] it was created from; an
/// append is durable once it returns.
#[derive(Clone)]
pub struct PendingChangeQueue {
    db: Arc<Mutex<Database>>,
    clock: Arc<dyn Clock>,
}

impl PendingChangeQueue {
    pub fn new(local: &LocalStore, clock: Arc<dyn Clock>) -> Self {
        Self {
            db: local.database(),
            clock,
        }
    }

    /// Record a change and return its queue-assigned id.
    pub async fn append(
        &self,
        entity_id: &str,
        change_type: ChangeType,
        payload: &Value,
    ) -> Result<i64> {
        let timestamp = self.clock.now_ms();
        let db = self.db.lock().await;
        let repo = LibSqlPendingChangeRepository::new(db.connection());
        let id = repo.append(entity_id, change_type, payload, timestamp).await?;
        tracing::debug!("Queued {} of {} as change {}", change_type, entity_id, id);
        Ok(id)
    }

    /// Changes in insertion order.
    pub async fn list(&self) -> Result<Vec<PendingChange>> {
        let db = self.db.lock().await;
        let repo = LibSqlPendingChangeRepository::new(db.connection());
        repo.list().await
    }

    /// Remove a confirmed change.
    pub async fn remove(&self, id: i64) -> Result<bool> {
        let db = self.db.lock().await;
        let repo = LibSqlPendingChangeRepository::new(db.connection());
        repo.remove(id).await
    }

    pub async fn len(&self) -> Result<usize> {
        let db = self.db.lock().await;
        let repo = LibSqlPendingChangeRepository::new(db.connection());
        repo.count().await
    }

    pub async fn is_empty(&self) -> Result<bool> {
        Ok(self.len().await? == 0)
    }

    /// Drop every queued change, returning how many were discarded.
    pub async fn clear(&self) -> Result<usize> {
        let db = self.db.lock().await;
        let repo = LibSqlPendingChangeRepository::new(db.connection());
        let dropped = repo.clear().await?;
        if dropped > 0 {
            tracing::info!("Discarded {} pending changes", dropped);
        }
        Ok(dropped)
    }

    /// Drop queued creates and updates of `entity_id` that the remote store
    /// already holds, i.e. whose payload is no newer than `confirmed_ms`.
    ///
    /// Returns how many changes were removed.
    pub async fn prune_confirmed(&self, entity_id: &str, confirmed_ms: i64) -> Result<usize> {
        let db = self.db.lock().await;
        let repo = LibSqlPendingChangeRepository::new(db.connection());
        let mut pruned = 0;
        for change in repo.list().await? {
            let is_write = matches!(change.change_type, ChangeType::Create | ChangeType::Update);
            let payload_ms = change.payload.get("lastModified").and_then(Value::as_i64);
            if change.entity_id == entity_id
                && is_write
                && payload_ms.is_some_and(|ms| ms <= confirmed_ms)
                && repo.remove(change.id).await?
            {
                pruned += 1;
            }
        }
        if pruned > 0 {
            tracing::debug!("Pruned {} confirmed changes to {}", pruned, entity_id);
        }
        Ok(pruned)
    }

    /// Entity ids with a queued delete.
    pub async fn pending_delete_ids(&self) -> Result<Vec<String>> {
        Ok(self
            .list()
            .await?
            .into_iter()
            .filter(|change| change.change_type == ChangeType::Delete)
            .map(|change| change.entity_id)
            .collect())
    }
}
