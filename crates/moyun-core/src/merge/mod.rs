//! Whole-entity last-writer-wins reconciliation.
//!
//! Everything in this module is pure: callers load both sides, reconcile, and
//! then execute the resulting upload and download sets themselves.

mod collection;

use std::collections::BTreeSet;

pub use collection::{decode_collection, DecodedCollection, Entity, EntityCollection};

/// Outcome of comparing one id across both sides
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// Local copy wins and must be written remotely
    Upload,
    /// Remote copy wins and must be written locally
    Download,
    /// Same timestamp on both sides; the local copy is kept
    Unchanged,
}

/// Decide between two optional timestamps; a missing side loses.
///
/// Equal timestamps keep the local copy without any transfer.
#[must_use]
pub fn resolve(local: Option<i64>, remote: Option<i64>) -> Option<Resolution> {
    match (local, remote) {
        (None, None) => None,
        (Some(_), None) => Some(Resolution::Upload),
        (None, Some(_)) => Some(Resolution::Download),
        (Some(local), Some(remote)) if local > remote => Some(Resolution::Upload),
        (Some(local), Some(remote)) if remote > local => Some(Resolution::Download),
        (Some(_), Some(_)) => Some(Resolution::Unchanged),
    }
}

/// Result of reconciling two collections
#[derive(Debug, Clone, PartialEq)]
pub struct Reconciliation<T> {
    /// Exactly one winning entry per id seen on either side
    pub merged: EntityCollection<T>,
    pub to_upload: BTreeSet<String>,
    pub to_download: BTreeSet<String>,
}

impl<T> Reconciliation<T> {
    /// Whether no transfer is needed in either direction.
    #[must_use]
    pub fn is_noop(&self) -> bool {
        self.to_upload.is_empty() && self.to_download.is_empty()
    }
}

/// Reconcile a local and a remote collection.
#[must_use]
pub fn reconcile<T: Entity>(
    local: &EntityCollection<T>,
    remote: &EntityCollection<T>,
) -> Reconciliation<T> {
    let ids: BTreeSet<&str> = local.ids().chain(remote.ids()).collect();

    let mut merged = EntityCollection::new();
    let mut to_upload = BTreeSet::new();
    let mut to_download = BTreeSet::new();

    for id in ids {
        let local_entity = local.get(id);
        let remote_entity = remote.get(id);

        let resolution = resolve(
            local_entity.map(Entity::last_modified),
            remote_entity.map(Entity::last_modified),
        );

        let winner = match resolution {
            Some(Resolution::Upload) => {
                tracing::debug!("{} {} is newer locally; marking upload", T::KIND, id);
                to_upload.insert(id.to_string());
                local_entity
            }
            Some(Resolution::Download) => {
                tracing::debug!("{} {} is newer remotely; marking download", T::KIND, id);
                to_download.insert(id.to_string());
                remote_entity
            }
            Some(Resolution::Unchanged) => local_entity,
            None => None,
        };

        if let Some(winner) = winner {
            merged.insert(winner.clone());
        }
    }

    Reconciliation {
        merged,
        to_upload,
        to_download,
    }
}
