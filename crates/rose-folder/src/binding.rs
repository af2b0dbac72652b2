//! Binding marker files
//!
//! A bound directory carries one JSON marker at its root:
//!
//! ```json
//! { "isClass": true, "object": { "UUID": "...", "NAME": "..." }, "lastUploadTimestamp": "..." }
//! ```
//!
//! `object` is the last-known remote snapshot. The marker is the only local
//! state; removing it disconnects the directory without touching its files.

use crate::error::FolderError;
use chrono::{DateTime, Utc};
use rose_record::{ScenarioKind, ScenarioRecord};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use uuid::Uuid;

/// Default marker file name
pub const DEFAULT_MARKER_FILENAME: &str = ".rose";

/// Link between a directory and a remote scenario
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Binding {
    pub is_class: bool,
    /// Cached remote snapshot
    pub object: ScenarioRecord,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_upload_timestamp: Option<DateTime<Utc>>,
}

impl Binding {
    /// Create binding for a freshly fetched or created scenario
    #[must_use]
    pub fn new(object: ScenarioRecord) -> Self {
        Self {
            is_class: object.is_class(),
            object,
            last_upload_timestamp: None,
        }
    }

    #[inline]
    #[must_use]
    pub fn uuid(&self) -> Uuid {
        self.object.uuid()
    }

    #[inline]
    #[must_use]
    pub fn name(&self) -> &str {
        self.object.name()
    }

    #[inline]
    #[must_use]
    pub fn kind(&self) -> ScenarioKind {
        self.object.kind()
    }

    /// Class uuid of an instance binding
    #[inline]
    #[must_use]
    pub fn class_uuid(&self) -> Option<Uuid> {
        self.object.class_uuid()
    }

    #[inline]
    #[must_use]
    pub fn is_local(&self) -> bool {
        self.object.is_local()
    }

    /// Replace the cached snapshot, keeping the upload timestamp
    pub fn refresh_object(&mut self, object: ScenarioRecord) {
        self.is_class = object.is_class();
        self.object = object;
    }
}

/// Reads and writes marker files
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarkerStore {
    filename: String,
}

impl Default for MarkerStore {
    fn default() -> Self {
        Self::new(DEFAULT_MARKER_FILENAME)
    }
}

impl MarkerStore {
    /// Create store using the given marker file name
    #[must_use]
    pub fn new(filename: impl Into<String>) -> Self {
        Self {
            filename: filename.into(),
        }
    }

    /// Marker file name
    #[inline]
    #[must_use]
    pub fn filename(&self) -> &str {
        &self.filename
    }

    /// Marker path for a directory
    #[must_use]
    pub fn marker_path(&self, dir: &Path) -> PathBuf {
        dir.join(&self.filename)
    }

    /// Check if a directory carries a marker (symlinked markers are ignored)
    #[must_use]
    pub fn has_marker(&self, dir: &Path) -> bool {
        fs::symlink_metadata(self.marker_path(dir)).is_ok_and(|m| m.is_file())
    }

    /// Read the binding of a directory
    pub fn load(&self, dir: &Path) -> Result<Binding, FolderError> {
        let path = self.marker_path(dir);
        let text = match fs::read_to_string(&path) {
            Ok(text) => text,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                return Err(FolderError::NotBound(dir.to_path_buf()))
            }
            Err(err) => return Err(FolderError::io_error(path, err)),
        };
        serde_json::from_str(&text).map_err(|e| FolderError::malformed(path, e.to_string()))
    }

    /// Write the binding of a directory
    pub fn save(&self, dir: &Path, binding: &Binding) -> Result<(), FolderError> {
        let path = self.marker_path(dir);
        let text = serde_json::to_string_pretty(binding)
            .map_err(|e| FolderError::malformed(&path, e.to_string()))?;
        fs::write(&path, text).map_err(|e| FolderError::io_error(&path, e))?;
        debug!(folder = %dir.display(), uuid = %binding.uuid(), "binding written");
        Ok(())
    }

    /// Remove the marker, leaving all other files in place
    ///
    /// Returns whether a marker existed.
    pub fn remove(&self, dir: &Path) -> Result<bool, FolderError> {
        let path = self.marker_path(dir);
        match fs::remove_file(&path) {
            Ok(()) => {
                info!(folder = %dir.display(), "binding removed");
                Ok(true)
            }
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(false),
            Err(err) => Err(FolderError::io_error(path, err)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn class_record() -> ScenarioRecord {
        ScenarioRecord::from_value(json!({
            "UUID": "586f14db-e121-8f74-b30f-8b070579ad51",
            "NAME": "FooLocal",
            "ISLOCAL": true
        }))
        .unwrap()
    }

    #[test]
    fn marker_json_shape() {
        let binding = Binding::new(class_record());
        let value = serde_json::to_value(&binding).unwrap();
        assert_eq!(value["isClass"], json!(true));
        assert_eq!(value["object"]["NAME"], json!("FooLocal"));
        assert!(value.get("lastUploadTimestamp").is_none());
    }

    #[test]
    fn save_load_remove() {
        let dir = tempfile::tempdir().unwrap();
        let store = MarkerStore::default();
        let mut binding = Binding::new(class_record());
        binding.last_upload_timestamp = Some(Utc::now());

        store.save(dir.path(), &binding).unwrap();
        assert!(store.has_marker(dir.path()));
        assert_eq!(store.load(dir.path()).unwrap(), binding);

        assert!(store.remove(dir.path()).unwrap());
        assert!(!store.remove(dir.path()).unwrap());
        assert!(matches!(store.load(dir.path()), Err(FolderError::NotBound(_))));
    }

    #[test]
    fn garbage_marker_is_malformed() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(".rose"), "{ nope").unwrap();
        let err = MarkerStore::default().load(dir.path()).unwrap_err();
        assert!(matches!(err, FolderError::Malformed { .. }));
    }

    #[test]
    fn reads_marker_written_without_timestamp() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(".rose"),
            r#"{"isClass": false, "object": {"UUID": "b4e9c8bf-de02-6f68-00ab-b7da1adb45bb", "NAME": "I1", "CLASS_UUID": "586f14db-e121-8f74-b30f-8b070579ad51"}}"#,
        )
        .unwrap();
        let binding = MarkerStore::default().load(dir.path()).unwrap();
        assert!(!binding.is_class);
        assert!(binding.class_uuid().is_some());
        assert_eq!(binding.last_upload_timestamp, None);
    }
}
