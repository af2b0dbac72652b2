//! Folder index
//!
//! Built on demand by a depth-first walk from a root directory. A directory
//! carrying a marker is a hit and its subtree is not descended: bindings do
//! not nest, so a marker below an already bound directory is invisible.
//! Symbolic links are never followed.
//!
//! The index is never persisted; rebuild it after anything rewrites markers.

use crate::binding::{Binding, MarkerStore};
use crate::error::FolderError;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use uuid::Uuid;

/// A marker that exists but could not be read
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MalformedMarker {
    pub path: PathBuf,
    pub reason: String,
}

/// Borrowed view of one bound directory
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IndexEntry<'a> {
    pub path: &'a Path,
    pub binding: &'a Binding,
}

/// Class lookup key: a bound directory or a remote id
#[derive(Debug, Clone, Copy)]
pub enum Lookup<'a> {
    Path(&'a Path),
    Uuid(Uuid),
}

impl<'a> From<&'a Path> for Lookup<'a> {
    fn from(path: &'a Path) -> Self {
        Self::Path(path)
    }
}

impl<'a> From<&'a PathBuf> for Lookup<'a> {
    fn from(path: &'a PathBuf) -> Self {
        Self::Path(path.as_path())
    }
}

impl From<Uuid> for Lookup<'_> {
    fn from(uuid: Uuid) -> Self {
        Self::Uuid(uuid)
    }
}

/// One class followed by its bound instances
#[derive(Debug, Clone)]
pub struct ClassGroup<'a> {
    pub class: IndexEntry<'a>,
    pub instances: Vec<IndexEntry<'a>>,
}

/// Bindings grouped for display
///
/// Classes appear in path order, each followed by its instances. Bindings
/// not reachable through a locally bound class are orphans.
#[derive(Debug, Clone)]
pub struct Listing<'a> {
    pub groups: Vec<ClassGroup<'a>>,
    pub orphans: Vec<IndexEntry<'a>>,
    pub malformed: &'a [MalformedMarker],
}

/// In-memory map of the bindings below a root directory
#[derive(Debug, Clone, Default)]
pub struct FolderIndex {
    root: PathBuf,
    by_path: BTreeMap<PathBuf, Binding>,
    by_uuid: HashMap<Uuid, PathBuf>,
    malformed: Vec<MalformedMarker>,
}

impl FolderIndex {
    /// Walk `root` and collect every binding
    pub fn scan(root: &Path, store: &MarkerStore) -> Result<Self, FolderError> {
        let root = normalize_path(root);
        let meta = fs::metadata(&root).map_err(|e| FolderError::io_error(&root, e))?;
        if !meta.is_dir() {
            return Err(FolderError::NotADirectory(root));
        }
        let mut index = Self {
            root: root.clone(),
            ..Self::default()
        };
        index.visit(&root, store);
        debug!(
            root = %root.display(),
            bindings = index.by_path.len(),
            malformed = index.malformed.len(),
            "folder index built"
        );
        Ok(index)
    }

    fn visit(&mut self, dir: &Path, store: &MarkerStore) {
        if store.has_marker(dir) {
            match store.load(dir) {
                Ok(binding) => self.insert(dir.to_path_buf(), binding),
                Err(err) => {
                    warn!(folder = %dir.display(), error = %err, "ignoring unreadable marker");
                    self.malformed.push(MalformedMarker {
                        path: dir.to_path_buf(),
                        reason: err.to_string(),
                    });
                }
            }
            return;
        }

        let entries = match fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(err) => {
                warn!(folder = %dir.display(), error = %err, "skipping unreadable directory");
                return;
            }
        };
        // file_type() does not follow symlinks
        let mut children: Vec<PathBuf> = entries
            .filter_map(Result::ok)
            .filter(|e| e.file_type().is_ok_and(|t| t.is_dir()))
            .map(|e| e.path())
            .collect();
        children.sort();
        for child in children {
            self.visit(&child, store);
        }
    }

    fn insert(&mut self, path: PathBuf, binding: Binding) {
        let uuid = binding.uuid();
        if let Some(first) = self.by_uuid.get(&uuid) {
            warn!(
                uuid = %uuid,
                first = %first.display(),
                duplicate = %path.display(),
                "uuid bound to more than one folder"
            );
        } else {
            self.by_uuid.insert(uuid, path.clone());
        }
        self.by_path.insert(path, binding);
    }

    #[inline]
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.by_path.len()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_path.is_empty()
    }

    /// Bindings keyed by absolute path
    #[inline]
    #[must_use]
    pub fn by_path(&self) -> &BTreeMap<PathBuf, Binding> {
        &self.by_path
    }

    /// Markers that could not be read
    #[inline]
    #[must_use]
    pub fn malformed(&self) -> &[MalformedMarker] {
        &self.malformed
    }

    /// All entries in path order
    pub fn iter(&self) -> impl Iterator<Item = IndexEntry<'_>> {
        self.by_path.iter().map(|(path, binding)| IndexEntry { path, binding })
    }

    /// Class entries in path order
    pub fn classes(&self) -> impl Iterator<Item = IndexEntry<'_>> {
        self.iter().filter(|e| e.binding.is_class)
    }

    /// Entry for a directory
    #[must_use]
    pub fn entry(&self, path: &Path) -> Option<IndexEntry<'_>> {
        self.by_path
            .get_key_value(&normalize_path(path))
            .map(|(path, binding)| IndexEntry { path, binding })
    }

    /// Binding of a directory
    #[must_use]
    pub fn get(&self, path: &Path) -> Option<&Binding> {
        self.entry(path).map(|e| e.binding)
    }

    /// Entry bound to a remote id
    #[must_use]
    pub fn find_uuid(&self, uuid: Uuid) -> Option<IndexEntry<'_>> {
        let path = self.by_uuid.get(&uuid)?;
        self.by_path
            .get_key_value(path)
            .map(|(path, binding)| IndexEntry { path, binding })
    }

    #[inline]
    #[must_use]
    pub fn contains_uuid(&self, uuid: Uuid) -> bool {
        self.by_uuid.contains_key(&uuid)
    }

    /// Class uuid named by a lookup key
    ///
    /// A path resolves only if it is a bound class directory; a uuid
    /// resolves to itself.
    #[must_use]
    pub fn resolve_class_uuid(&self, lookup: Lookup<'_>) -> Option<Uuid> {
        match lookup {
            Lookup::Uuid(uuid) => Some(uuid),
            Lookup::Path(path) => self
                .get(path)
                .filter(|b| b.is_class)
                .map(Binding::uuid),
        }
    }

    /// Instance entries whose class is the given one, in path order
    #[must_use]
    pub fn instances_of_class<'a>(&self, class: impl Into<Lookup<'a>>) -> Vec<IndexEntry<'_>> {
        let Some(class_uuid) = self.resolve_class_uuid(class.into()) else {
            return Vec::new();
        };
        self.iter()
            .filter(|e| e.binding.class_uuid() == Some(class_uuid))
            .collect()
    }

    /// Bound class directory of an instance directory
    #[must_use]
    pub fn class_of_instance(&self, path: &Path) -> Option<IndexEntry<'_>> {
        let class_uuid = self.get(path)?.class_uuid()?;
        self.find_uuid(class_uuid).filter(|e| e.binding.is_class)
    }

    /// Group all bindings for display
    #[must_use]
    pub fn listing(&self) -> Listing<'_> {
        let mut placed: HashSet<&Path> = HashSet::new();
        let mut groups = Vec::new();
        for class in self.classes() {
            let instances = self.instances_of_class(class.binding.uuid());
            placed.insert(class.path);
            placed.extend(instances.iter().map(|e| e.path));
            groups.push(ClassGroup { class, instances });
        }
        let orphans = self.iter().filter(|e| !placed.contains(e.path)).collect();
        Listing {
            groups,
            orphans,
            malformed: &self.malformed,
        }
    }

    /// A directory together with its related bindings
    ///
    /// For a class: the class and its instances. For an instance: the
    /// instance and, when bound locally, its class.
    pub fn related(&self, path: &Path) -> Result<Vec<IndexEntry<'_>>, FolderError> {
        let entry = self
            .entry(path)
            .ok_or_else(|| FolderError::NotBound(path.to_path_buf()))?;
        let mut out = vec![entry];
        if entry.binding.is_class {
            out.extend(self.instances_of_class(entry.path));
        } else if let Some(class) = self.class_of_instance(entry.path) {
            out.push(class);
        }
        Ok(out)
    }
}

/// Absolute, symlink-resolved form of a path when it exists
#[must_use]
pub fn normalize_path(path: &Path) -> PathBuf {
    if let Ok(canonical) = fs::canonicalize(path) {
        return canonical;
    }
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir().map_or_else(|_| path.to_path_buf(), |cwd| cwd.join(path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rose_record::ScenarioRecord;
    use serde_json::json;

    #[test]
    fn nested_marker_is_invisible() {
        let root = tempfile::tempdir().unwrap();
        let store = MarkerStore::default();
        let outer = root.path().join("outer");
        let inner = outer.join("inner");
        fs::create_dir_all(&inner).unwrap();
        let record = |uuid: &str| {
            ScenarioRecord::from_value(json!({ "UUID": uuid, "NAME": "x" })).unwrap()
        };
        store
            .save(&outer, &Binding::new(record("586f14db-e121-8f74-b30f-8b070579ad51")))
            .unwrap();
        store
            .save(&inner, &Binding::new(record("b4e9c8bf-de02-6f68-00ab-b7da1adb45bb")))
            .unwrap();

        let index = FolderIndex::scan(root.path(), &store).unwrap();
        assert_eq!(index.len(), 1);
        assert!(index.get(&outer).is_some());
        assert!(index.get(&inner).is_none());
    }

    #[test]
    fn scanning_a_file_fails() {
        let root = tempfile::tempdir().unwrap();
        let file = root.path().join("f.txt");
        fs::write(&file, "x").unwrap();
        let err = FolderIndex::scan(&file, &MarkerStore::default()).unwrap_err();
        assert!(matches!(err, FolderError::NotADirectory(_)));
    }
}
