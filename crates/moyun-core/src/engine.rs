//! Engine context tying the components together.
//!
//! A [`SyncEngine`] is built from explicit handles (local store, remote store,
//! clock, device identity, configuration) and wires them into the
//! orchestrator, backup manager and device registry. Nothing is global.

use std::sync::{Arc, Mutex as StdMutex, PoisonError};

use tokio::sync::watch;

use crate::backup::{AutoBackup, BackupManager, RestoreReport};
use crate::clock::{Clock, DeviceId};
use crate::config::EngineConfig;
use crate::devices::DeviceRegistry;
use crate::models::{
    BackupSummary, DeviceHeartbeat, Document, DocumentIndexEntry, LibraryItem, PendingChange,
    Settings,
};
use crate::remote::{RemoteStore, RemoteTransport};
use crate::services::{AutosaveQueue, LocalStore};
use crate::state::SyncState;
use crate::sync::{DrainReport, SyncOrchestrator, SyncSummary};
use crate::Result;

/// Handles an engine is built from
pub struct EngineContext<T> {
    pub local: LocalStore,
    pub remote: RemoteStore<T>,
    pub clock: Arc<dyn Clock>,
    pub device_id: DeviceId,
    pub config: EngineConfig,
}

impl<T: RemoteTransport> EngineContext<T> {
    /// Build a context, loading or creating the persisted device id.
    pub async fn load(
        local: LocalStore,
        remote: RemoteStore<T>,
        clock: Arc<dyn Clock>,
        config: EngineConfig,
    ) -> Result<Self> {
        let device_id = DeviceId::load_or_create(&local).await?;
        Ok(Self {
            local,
            remote,
            clock,
            device_id,
            config,
        })
    }
}

/// What happened after a sign-in or sign-out
#[derive(Debug, Clone, PartialEq)]
pub struct AuthTransition {
    pub sync: SyncSummary,
    pub auto_backup: Option<AutoBackup>,
    pub heartbeat: bool,
}

/// What happened after connectivity came back
#[derive(Debug, Clone, PartialEq)]
pub struct Reconnect {
    pub drain: DrainReport,
    pub sync: SyncSummary,
}

pub struct SyncEngine<T> {
    orchestrator: SyncOrchestrator<T>,
    backups: BackupManager<T>,
    devices: DeviceRegistry<T>,
    clock: Arc<dyn Clock>,
    config: EngineConfig,
    autosave: StdMutex<AutosaveQueue<Document>>,
}

impl<T: RemoteTransport> SyncEngine<T> {
    pub fn new(context: EngineContext<T>) -> Self {
        let EngineContext {
            local,
            remote,
            clock,
            device_id,
            config,
        } = context;

        let orchestrator = SyncOrchestrator::new(local.clone(), remote.clone(), Arc::clone(&clock));
        let backups = BackupManager::new(local, remote.clone(), Arc::clone(&clock));
        let devices = DeviceRegistry::new(
            remote,
            Arc::clone(&clock),
            device_id,
            config.client_descriptor.clone(),
        );
        let autosave = StdMutex::new(AutosaveQueue::new(config.autosave_min_interval_ms));

        Self {
            orchestrator,
            backups,
            devices,
            clock,
            config,
            autosave,
        }
    }

    #[must_use]
    pub const fn config(&self) -> &EngineConfig {
        &self.config
    }

    #[must_use]
    pub const fn orchestrator(&self) -> &SyncOrchestrator<T> {
        &self.orchestrator
    }

    #[must_use]
    pub const fn device_id(&self) -> &DeviceId {
        self.devices.device_id()
    }

    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<SyncState> {
        self.orchestrator.subscribe()
    }

    #[must_use]
    pub fn status(&self) -> SyncState {
        self.orchestrator.status()
    }

    /// React to a sign-in or sign-out: sync, back up if due, then heartbeat.
    pub async fn on_auth_changed(&self) -> AuthTransition {
        let sync = self.orchestrator.sync_all().await;
        if !sync.ran {
            return AuthTransition {
                sync,
                auto_backup: None,
                heartbeat: false,
            };
        }

        let auto_backup = match self.run_auto_backup().await {
            Ok(outcome) => Some(outcome),
            Err(error) => {
                tracing::warn!("Automatic backup failed: {}", error);
                None
            }
        };
        let heartbeat = self.heartbeat().await.unwrap_or_else(|error| {
            tracing::warn!("Heartbeat failed: {}", error);
            false
        });

        AuthTransition {
            sync,
            auto_backup,
            heartbeat,
        }
    }

    /// Connectivity came back: replay the queue, then sync everything.
    pub async fn on_reachable(&self) -> Reconnect {
        self.orchestrator.on_reachable();
        let drain = self.orchestrator.drain().await;
        let sync = self.orchestrator.sync_all().await;
        Reconnect { drain, sync }
    }

    pub fn on_unreachable(&self) {
        self.orchestrator.on_unreachable();
    }

    pub async fn sync_all(&self) -> SyncSummary {
        self.orchestrator.sync_all().await
    }

    pub async fn drain(&self) -> DrainReport {
        self.orchestrator.drain().await
    }

    pub async fn pending(&self) -> Result<Vec<PendingChange>> {
        self.orchestrator.queue().list().await
    }

    pub async fn discard_pending(&self) -> Result<usize> {
        self.orchestrator.queue().clear().await
    }

    pub async fn save_document(&self, document: Document) -> Result<Document> {
        self.orchestrator.save_document(document).await
    }

    pub async fn delete_document(&self, id: &str) -> Result<bool> {
        self.orchestrator.delete_document(id).await
    }

    pub async fn document(&self, id: &str) -> Result<Option<Document>> {
        self.orchestrator.document(id).await
    }

    pub async fn document_index(&self) -> Result<Vec<DocumentIndexEntry>> {
        self.orchestrator.document_index().await
    }

    pub async fn settings(&self) -> Result<Option<Settings>> {
        self.orchestrator.local().load_settings().await
    }

    pub async fn save_settings(&self, settings: Settings) -> Result<Settings> {
        self.orchestrator.save_settings(settings).await
    }

    pub async fn library(&self) -> Result<Vec<LibraryItem>> {
        self.orchestrator.library().await
    }

    pub async fn save_library_item(&self, item: LibraryItem) -> Result<LibraryItem> {
        self.orchestrator.save_library_item(item).await
    }

    pub async fn remove_library_item(&self, id: &str) -> Result<bool> {
        self.orchestrator.remove_library_item(id).await
    }

    /// Note that a document changed; it is saved by the next due flush.
    pub fn notify_edit(&self, document: Document) {
        let mut queue = self.autosave.lock().unwrap_or_else(PoisonError::into_inner);
        queue.notify(document.id.clone(), document);
    }

    /// When the next autosave becomes due, if anything is waiting.
    #[must_use]
    pub fn next_autosave_at(&self) -> Option<i64> {
        self.autosave
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .next_due_at()
    }

    /// Save every edited document whose minimum interval has elapsed.
    ///
    /// Returns how many were saved. A failed save is queued again.
    pub async fn flush_autosave(&self) -> Result<usize> {
        let due = {
            let mut queue = self.autosave.lock().unwrap_or_else(PoisonError::into_inner);
            queue.take_due(self.clock.now_ms())
        };

        let mut saved = 0;
        let mut first_error = None;
        for (id, document) in due {
            match self.orchestrator.save_document(document.clone()).await {
                Ok(_) => saved += 1,
                Err(error) => {
                    tracing::warn!("Autosave of {} failed: {}", id, error);
                    self.autosave
                        .lock()
                        .unwrap_or_else(PoisonError::into_inner)
                        .requeue(id, document);
                    first_error.get_or_insert(error);
                }
            }
        }

        match first_error {
            Some(error) if saved == 0 => Err(error),
            _ => Ok(saved),
        }
    }

    pub async fn create_backup(&self, note: &str) -> Result<BackupSummary> {
        self.backups.create(note).await
    }

    pub async fn list_backups(&self) -> Result<Vec<BackupSummary>> {
        self.backups.list().await
    }

    pub async fn delete_backup(&self, id: &str) -> Result<()> {
        self.backups.delete(id).await
    }

    /// Prune backups older than `max_age_days`, or the configured retention.
    pub async fn prune_backups(&self, max_age_days: Option<u32>) -> Result<usize> {
        self.backups
            .prune(max_age_days.unwrap_or(self.config.backup_retention_days))
            .await
    }

    /// Restore a backup while no sync, drain or mutation can run.
    ///
    /// Pending changes are discarded afterwards so edits made before the
    /// restore are not replayed over it.
    pub async fn restore_backup(&self, id: &str) -> Result<RestoreReport> {
        let _exclusive = self.orchestrator.exclusive().await;
        let report = self.backups.restore(id).await?;
        self.orchestrator.queue().clear().await?;
        self.autosave
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
        Ok(report)
    }

    pub async fn run_auto_backup(&self) -> Result<AutoBackup> {
        self.backups
            .run_auto_backup(
                self.config.auto_backup_interval_ms(),
                self.config.backup_retention_days,
            )
            .await
    }

    pub async fn heartbeat(&self) -> Result<bool> {
        self.devices.heartbeat().await
    }

    pub async fn devices(&self) -> Result<Vec<DeviceHeartbeat>> {
        self.devices.devices().await
    }

    pub async fn active_device_count(&self) -> Result<usize> {
        self.devices
            .active_device_count(self.config.device_liveness_ms())
            .await
    }
}
