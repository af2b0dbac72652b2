//! Drift detection between bindings and the server
//!
//! A binding caches a snapshot of its remote record. [`Reconciler::refresh`]
//! compares the tracked fields (`NAME`, `ISLOCAL`, `CLASS_UUID`) of that
//! snapshot with the server and either rewrites the marker or, when the
//! record is gone, removes it. Directory contents are never touched.

use crate::error::SyncError;
use rose_folder::{Binding, FolderIndex, MarkerStore};
use rose_record::{field, ScenarioRecord};
use rose_remote::ScenarioApi;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Result of refreshing one binding
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// Snapshot matches the server
    Unchanged,
    /// Snapshot was replaced; lists the tracked fields that differed
    Updated { changed_fields: Vec<&'static str> },
    /// Remote record is gone; the marker was removed
    Disconnected,
}

impl RefreshOutcome {
    /// Whether the local binding was rewritten or removed
    #[inline]
    #[must_use]
    pub fn changed(&self) -> bool {
        !matches!(self, Self::Unchanged)
    }
}

/// Summary of [`Reconciler::cleanup_all`]
#[derive(Debug, Default)]
pub struct CleanupSummary {
    pub unchanged: Vec<PathBuf>,
    pub updated: Vec<PathBuf>,
    /// Folders disconnected, with the name of the vanished scenario
    pub disconnected: Vec<(PathBuf, String)>,
    pub failed: Vec<(PathBuf, SyncError)>,
}

impl CleanupSummary {
    /// Number of bindings checked
    #[must_use]
    pub fn checked(&self) -> usize {
        self.unchanged.len() + self.updated.len() + self.disconnected.len() + self.failed.len()
    }
}

/// Keeps cached snapshots consistent with the server
#[derive(Debug, Clone)]
pub struct Reconciler {
    api: ScenarioApi,
    store: MarkerStore,
}

impl Reconciler {
    #[must_use]
    pub fn new(api: ScenarioApi, store: MarkerStore) -> Self {
        Self { api, store }
    }

    /// Compare a binding with the server and repair it
    ///
    /// `binding` is updated in place when the snapshot changes.
    pub async fn refresh(&self, folder: &Path, binding: &mut Binding) -> Result<RefreshOutcome, SyncError> {
        let remote = match self.api.scenario(binding.uuid()).await {
            Ok(remote) => remote,
            Err(err) if err.is_not_found() => {
                self.store.remove(folder)?;
                info!(
                    folder = %folder.display(),
                    uuid = %binding.uuid(),
                    name = binding.name(),
                    "scenario no longer exists; folder disconnected"
                );
                return Ok(RefreshOutcome::Disconnected);
            }
            Err(err) => return Err(err.into()),
        };

        let changed_fields = tracked_differences(&binding.object, &remote);
        if changed_fields.is_empty() {
            debug!(folder = %folder.display(), uuid = %binding.uuid(), "binding up to date");
            return Ok(RefreshOutcome::Unchanged);
        }
        binding.refresh_object(remote);
        self.store.save(folder, binding)?;
        info!(
            folder = %folder.display(),
            uuid = %binding.uuid(),
            fields = ?changed_fields,
            "binding updated from server"
        );
        Ok(RefreshOutcome::Updated { changed_fields })
    }

    /// Refresh and turn a disconnection into [`SyncError::StaleBinding`]
    pub async fn ensure_current(&self, folder: &Path, binding: &mut Binding) -> Result<RefreshOutcome, SyncError> {
        match self.refresh(folder, binding).await? {
            RefreshOutcome::Disconnected => Err(SyncError::StaleBinding {
                path: folder.to_path_buf(),
                name: binding.name().to_string(),
                uuid: binding.uuid(),
            }),
            outcome => Ok(outcome),
        }
    }

    /// Refresh every binding in the index, one at a time
    ///
    /// Failures are collected; they do not stop the remaining checks.
    pub async fn cleanup_all(&self, index: &FolderIndex) -> CleanupSummary {
        let mut summary = CleanupSummary::default();
        for (path, binding) in index.by_path() {
            let mut binding = binding.clone();
            match self.refresh(path, &mut binding).await {
                Ok(RefreshOutcome::Unchanged) => summary.unchanged.push(path.clone()),
                Ok(RefreshOutcome::Updated { .. }) => summary.updated.push(path.clone()),
                Ok(RefreshOutcome::Disconnected) => {
                    summary
                        .disconnected
                        .push((path.clone(), binding.name().to_string()));
                }
                Err(err) => {
                    warn!(folder = %path.display(), error = %err, "could not check binding");
                    summary.failed.push((path.clone(), err));
                }
            }
        }
        info!(
            checked = summary.checked(),
            updated = summary.updated.len(),
            disconnected = summary.disconnected.len(),
            failed = summary.failed.len(),
            "cleanup finished"
        );
        summary
    }
}

fn tracked_differences(cached: &ScenarioRecord, remote: &ScenarioRecord) -> Vec<&'static str> {
    let mut changed = Vec::new();
    if cached.name() != remote.name() {
        changed.push(field::NAME);
    }
    if cached.is_local() != remote.is_local() {
        changed.push(field::IS_LOCAL);
    }
    if cached.class_uuid() != remote.class_uuid() {
        changed.push(field::CLASS_UUID);
    }
    changed
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(value: serde_json::Value) -> ScenarioRecord {
        ScenarioRecord::from_value(value).unwrap()
    }

    #[test]
    fn only_tracked_fields_count() {
        let cached = record(json!({ "UUID": "586f14db-e121-8f74-b30f-8b070579ad51", "NAME": "Foo", "ISLOCAL": false }));
        let same = record(json!({
            "UUID": "586f14db-e121-8f74-b30f-8b070579ad51", "NAME": "Foo", "ISLOCAL": 0,
            "MODIFIED_TIMESTAMP": "2026-01-01"
        }));
        assert!(tracked_differences(&cached, &same).is_empty());

        let renamed = record(json!({
            "UUID": "586f14db-e121-8f74-b30f-8b070579ad51", "NAME": "Bar", "ISLOCAL": "true"
        }));
        assert_eq!(tracked_differences(&cached, &renamed), vec!["NAME", "ISLOCAL"]);
    }

    #[test]
    fn outcome_changed_flag() {
        assert!(!RefreshOutcome::Unchanged.changed());
        assert!(RefreshOutcome::Disconnected.changed());
        assert!(RefreshOutcome::Updated { changed_fields: vec!["NAME"] }.changed());
    }
}
