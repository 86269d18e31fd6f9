//! Pending-change replay

use super::{DrainReport, FailedChange, SyncOrchestrator};
use crate::merge::decode_collection;
use crate::models::{ChangeType, Document, DocumentIndexEntry, PendingChange};
use crate::remote::{paths, RemoteTransport};
use crate::{Error, Result};

/// What replaying one change did remotely
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Replay {
    Applied,
    /// The remote copy was already newer; nothing was written
    Superseded,
}

impl<T: RemoteTransport> SyncOrchestrator<T> {
    /// Replay queued changes in order, removing each one only once confirmed.
    ///
    /// Failed changes stay queued and the drain moves on to the next one.
    pub async fn drain(&self) -> DrainReport {
        let _drain = self.drain_lock.lock().await;

        if !self.is_online() {
            return DrainReport::not_run("offline");
        }
        if !self.remote.is_authenticated() {
            return DrainReport::not_run(Error::NotAuthenticated.user_message());
        }

        let changes = match self.queue.list().await {
            Ok(changes) => changes,
            Err(error) => {
                tracing::warn!("Failed to read pending changes: {}", error);
                return DrainReport::not_run(error.user_message());
            }
        };
        if changes.is_empty() {
            return DrainReport {
                success: true,
                ..DrainReport::default()
            };
        }

        tracing::info!("Replaying {} pending changes", changes.len());
        let mut report = DrainReport::default();

        for change in changes {
            let outcome = match self.replay(&change).await {
                Ok(replay) => self.queue.remove(change.id).await.map(|_| replay),
                Err(error) => Err(error),
            };

            match outcome {
                Ok(Replay::Applied) => report.count += 1,
                Ok(Replay::Superseded) => {
                    tracing::info!(
                        "Change {} to {} superseded by a newer remote copy",
                        change.id,
                        change.entity_id
                    );
                    report.count += 1;
                }
                Err(error) => {
                    tracing::warn!(
                        "Change {} ({} {}) failed and stays queued: {}",
                        change.id,
                        change.change_type,
                        change.entity_id,
                        error
                    );
                    report.failed.push(FailedChange {
                        reason: error.user_message(),
                        change,
                    });
                }
            }
        }

        report.success = report.failed.is_empty();
        tracing::info!(
            "Drain finished: {} replayed, {} failed",
            report.count,
            report.failed.len()
        );
        report
    }

    async fn replay(&self, change: &PendingChange) -> Result<Replay> {
        match change.change_type {
            ChangeType::Create | ChangeType::Update => {
                let _document = self.document_locks.lock(&change.entity_id).await;
                self.replay_write(change).await
            }
            ChangeType::Delete => {
                let _index = self.index_lock.lock().await;
                let _document = self.document_locks.lock(&change.entity_id).await;
                self.replay_delete(&change.entity_id).await
            }
            ChangeType::Unknown => Err(Error::InvalidInput(format!(
                "queued change {} is corrupt: unknown change type",
                change.id
            ))),
        }
    }

    async fn replay_write(&self, change: &PendingChange) -> Result<Replay> {
        let document = Document::from_value(&change.entity_id, change.payload.clone())
            .map_err(|error| {
                Error::InvalidInput(format!("queued change {} is corrupt: {error}", change.id))
            })?;

        if let Some(remote) = self.fetch_remote_document(&document.id).await? {
            if remote.last_modified > document.last_modified {
                return Ok(Replay::Superseded);
            }
        }

        let value = serde_json::to_value(&document)?;
        self.remote_write(&paths::document(&document.id), &value)
            .await?;
        Ok(Replay::Applied)
    }

    async fn replay_delete(&self, id: &str) -> Result<Replay> {
        self.remote_delete(&paths::document(id)).await?;

        let value = self.remote.read(paths::DOC_INDEX).await?;
        let mut remote = decode_collection::<DocumentIndexEntry>(value.as_ref(), "remote index");
        if remote.collection.remove(id).is_some() {
            let value = serde_json::to_value(remote.collection.sorted_by_recency())?;
            self.remote_write(paths::DOC_INDEX, &value).await?;
        }
        Ok(Replay::Applied)
    }
}
