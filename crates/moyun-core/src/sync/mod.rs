//! Sync orchestrator.
//!
//! Reconciles each entity kind between the local cache and the remote store,
//! applies local mutations, and replays the pending-change queue.
//!
//! Locks are always taken in this order: drain, settings, index, library,
//! then per-document. Every pass is derived from current state on both sides,
//! so an interrupted pass converges on the next run.

mod drain;
mod mutations;
mod passes;
mod summary;

#[cfg(test)]
mod tests;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::{watch, Mutex, MutexGuard};

pub use summary::{DrainReport, FailedChange, KindOutcome, SyncKind, SyncSummary};

use crate::clock::Clock;
use crate::remote::{RemoteStore, RemoteTransport};
use crate::services::{KeyedLocks, LocalStore, PendingChangeQueue};
use crate::state::SyncState;
use crate::Result;

pub struct SyncOrchestrator<T> {
    local: LocalStore,
    remote: RemoteStore<T>,
    queue: PendingChangeQueue,
    clock: Arc<dyn Clock>,
    status: watch::Sender<SyncState>,
    online: AtomicBool,
    drain_lock: Mutex<()>,
    settings_lock: Mutex<()>,
    index_lock: Mutex<()>,
    library_lock: Mutex<()>,
    document_locks: KeyedLocks,
}

/// Holds every per-kind lock; no sync, drain or mutation runs while it lives.
pub struct ExclusiveGuard<'a> {
    _drain: MutexGuard<'a, ()>,
    _settings: MutexGuard<'a, ()>,
    _index: MutexGuard<'a, ()>,
    _library: MutexGuard<'a, ()>,
}

/// Sets `error` if a pass is abandoned before reporting its final state.
struct StatusGuard<'a> {
    status: &'a watch::Sender<SyncState>,
    finished: bool,
}

impl<'a> StatusGuard<'a> {
    fn begin(status: &'a watch::Sender<SyncState>) -> Self {
        status.send_replace(SyncState::Syncing);
        Self {
            status,
            finished: false,
        }
    }

    fn finish(mut self, state: SyncState) {
        self.status.send_replace(state);
        self.finished = true;
    }
}

impl Drop for StatusGuard<'_> {
    fn drop(&mut self) {
        if !self.finished {
            self.status.send_replace(SyncState::Error);
        }
    }
}

impl<T: RemoteTransport> SyncOrchestrator<T> {
    pub fn new(local: LocalStore, remote: RemoteStore<T>, clock: Arc<dyn Clock>) -> Self {
        let queue = PendingChangeQueue::new(&local, Arc::clone(&clock));
        let (status, _) = watch::channel(SyncState::Idle);
        Self {
            local,
            remote,
            queue,
            clock,
            status,
            online: AtomicBool::new(true),
            drain_lock: Mutex::new(()),
            settings_lock: Mutex::new(()),
            index_lock: Mutex::new(()),
            library_lock: Mutex::new(()),
            document_locks: KeyedLocks::new(),
        }
    }

    #[must_use]
    pub const fn local(&self) -> &LocalStore {
        &self.local
    }

    #[must_use]
    pub const fn remote(&self) -> &RemoteStore<T> {
        &self.remote
    }

    #[must_use]
    pub const fn queue(&self) -> &PendingChangeQueue {
        &self.queue
    }

    /// Observe sync status changes.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<SyncState> {
        self.status.subscribe()
    }

    #[must_use]
    pub fn status(&self) -> SyncState {
        *self.status.borrow()
    }

    #[must_use]
    pub fn is_online(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }

    pub fn on_reachable(&self) {
        if !self.online.swap(true, Ordering::SeqCst) {
            tracing::info!("Remote store reachable again");
        }
    }

    pub fn on_unreachable(&self) {
        if self.online.swap(false, Ordering::SeqCst) {
            tracing::info!("Remote store unreachable; working offline");
        }
    }

    /// Wait for every per-kind lock.
    pub async fn exclusive(&self) -> ExclusiveGuard<'_> {
        let drain = self.drain_lock.lock().await;
        let settings = self.settings_lock.lock().await;
        let index = self.index_lock.lock().await;
        let library = self.library_lock.lock().await;
        ExclusiveGuard {
            _drain: drain,
            _settings: settings,
            _index: index,
            _library: library,
        }
    }

    pub async fn sync_settings(&self) -> Result<KindOutcome> {
        let _kind = self.settings_lock.lock().await;
        self.settings_pass().await
    }

    pub async fn sync_document_index(&self) -> Result<KindOutcome> {
        let _kind = self.index_lock.lock().await;
        self.document_index_pass().await
    }

    pub async fn sync_library(&self) -> Result<KindOutcome> {
        let _kind = self.library_lock.lock().await;
        self.library_pass().await
    }

    /// Sync settings, then documents, then the library.
    ///
    /// A kind that fails is reported and the remaining kinds still run.
    pub async fn sync_all(&self) -> SyncSummary {
        if !self.remote.is_authenticated() {
            tracing::debug!("Skipping sync: not signed in");
            return SyncSummary::skipped();
        }

        let status = StatusGuard::begin(&self.status);
        tracing::info!("Sync started");

        let outcomes = vec![
            Self::settle(SyncKind::Settings, self.sync_settings().await),
            Self::settle(SyncKind::DocumentIndex, self.sync_document_index().await),
            Self::settle(SyncKind::Library, self.sync_library().await),
        ];
        let summary = SyncSummary {
            ran: true,
            outcomes,
        };

        if summary.is_success() {
            tracing::info!(
                "Sync finished: {} uploaded, {} downloaded",
                summary.total_uploads(),
                summary.total_downloads()
            );
            status.finish(SyncState::Synced);
        } else {
            status.finish(SyncState::Error);
        }
        summary
    }

    fn settle(kind: SyncKind, result: Result<KindOutcome>) -> KindOutcome {
        match result {
            Ok(outcome) => outcome,
            Err(error) => {
                if error.is_permission_denied() {
                    tracing::error!("Sync of {} denied by the remote store: {}", kind, error);
                } else {
                    tracing::warn!("Sync of {} failed: {}", kind, error);
                }
                KindOutcome::failed(kind, error.user_message())
            }
        }
    }
}
