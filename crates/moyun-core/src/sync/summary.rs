//! Outcomes reported by sync passes and queue drains

use std::fmt;

use serde::Serialize;

use crate::models::PendingChange;

/// Entity kinds reconciled by a sync pass
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum SyncKind {
    Settings,
    DocumentIndex,
    Library,
}

impl SyncKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Settings => "settings",
            Self::DocumentIndex => "documents",
            Self::Library => "library",
        }
    }
}

impl fmt::Display for SyncKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// Result of syncing one entity kind
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct KindOutcome {
    pub kind: SyncKind,
    pub uploads: usize,
    pub downloads: usize,
    /// Malformed entries ignored on either side
    pub skipped: usize,
    /// Short reason when the pass failed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<String>,
}

impl KindOutcome {
    #[must_use]
    pub const fn new(kind: SyncKind) -> Self {
        Self {
            kind,
            uploads: 0,
            downloads: 0,
            skipped: 0,
            failure: None,
        }
    }

    #[must_use]
    pub fn failed(kind: SyncKind, reason: impl Into<String>) -> Self {
        Self {
            failure: Some(reason.into()),
            ..Self::new(kind)
        }
    }

    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.failure.is_none()
    }
}

/// Result of a full sync across every kind
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncSummary {
    /// `false` when the pass was skipped because nobody is signed in
    pub ran: bool,
    pub outcomes: Vec<KindOutcome>,
}

impl SyncSummary {
    #[must_use]
    pub fn skipped() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn is_success(&self) -> bool {
        self.outcomes.iter().all(KindOutcome::is_success)
    }

    #[must_use]
    pub fn outcome(&self, kind: SyncKind) -> Option<&KindOutcome> {
        self.outcomes.iter().find(|outcome| outcome.kind == kind)
    }

    #[must_use]
    pub fn total_uploads(&self) -> usize {
        self.outcomes.iter().map(|outcome| outcome.uploads).sum()
    }

    #[must_use]
    pub fn total_downloads(&self) -> usize {
        self.outcomes.iter().map(|outcome| outcome.downloads).sum()
    }

    /// Failure reasons keyed by kind.
    pub fn failures(&self) -> impl Iterator<Item = (SyncKind, &str)> {
        self.outcomes
            .iter()
            .filter_map(|outcome| Some((outcome.kind, outcome.failure.as_deref()?)))
    }
}

/// A queued change that could not be replayed
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FailedChange {
    pub change: PendingChange,
    pub reason: String,
}

/// Result of draining the pending-change queue
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct DrainReport {
    pub success: bool,
    /// Changes confirmed and removed from the queue
    pub count: usize,
    pub failed: Vec<FailedChange>,
    /// Why the drain did not run at all
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl DrainReport {
    #[must_use]
    pub fn not_run(reason: impl Into<String>) -> Self {
        Self {
            success: false,
            count: 0,
            failed: Vec::new(),
            reason: Some(reason.into()),
        }
    }

    /// Queue ids of the changes that failed.
    #[must_use]
    pub fn failed_ids(&self) -> Vec<i64> {
        self.failed.iter().map(|failed| failed.change.id).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn summary_aggregates_outcomes() {
        let mut documents = KindOutcome::new(SyncKind::DocumentIndex);
        documents.uploads = 2;
        documents.downloads = 1;
        let summary = SyncSummary {
            ran: true,
            outcomes: vec![
                KindOutcome::new(SyncKind::Settings),
                documents,
                KindOutcome::failed(SyncKind::Library, "denied"),
            ],
        };

        assert!(!summary.is_success());
        assert_eq!(summary.total_uploads(), 2);
        assert_eq!(summary.total_downloads(), 1);
        assert_eq!(
            summary.failures().collect::<Vec<_>>(),
            vec![(SyncKind::Library, "denied")]
        );
    }

    #[test]
    fn not_run_drain_is_unsuccessful() {
        let report = DrainReport::not_run("offline");
        assert!(!report.success);
        assert_eq!(report.reason.as_deref(), Some("offline"));
        assert!(report.failed_ids().is_empty());
    }
}
