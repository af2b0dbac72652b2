//! Archive codec
//!
//! Code travels between folder and server as one opaque blob. The engine
//! only chooses what goes in ([`PackFilter`]) and how it comes out
//! ([`UnpackPolicy`]); the format is behind [`ArchiveCodec`]. The bundled
//! [`ZipCodec`] speaks the zip format the server generates and accepts.

use std::ffi::OsStr;
use std::fmt;
use std::fs;
use std::io::{Cursor, Write};
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;
use tracing::{debug, warn};
use walkdir::WalkDir;
use zip::result::ZipError;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

/// Errors while packing or unpacking
#[derive(Debug, thiserror::Error)]
pub enum ArchiveError {
    /// IO error on a file inside the tree
    #[error("io error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Blob is not a readable archive
    #[error("invalid archive: {0}")]
    Format(String),

    /// Background pack/unpack task did not complete
    #[error("archive task failed: {0}")]
    Task(String),
}

impl ArchiveError {
    /// Create IO error for path
    pub fn io_error(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Predicate deciding whether a file is packed
pub type FileWhitelist = Arc<dyn Fn(&Path) -> bool + Send + Sync>;

/// Selection of files to pack
#[derive(Clone, Default)]
pub struct PackFilter {
    /// Names skipped at any depth (directories are pruned)
    excluded_names: Vec<String>,
    /// Names skipped only directly below the source root
    excluded_root_names: Vec<String>,
    /// Only files modified strictly after this instant
    modified_after: Option<SystemTime>,
    whitelist: Option<FileWhitelist>,
}

impl fmt::Debug for PackFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PackFilter")
            .field("excluded_names", &self.excluded_names)
            .field("excluded_root_names", &self.excluded_root_names)
            .field("modified_after", &self.modified_after)
            .field("whitelist", &self.whitelist.is_some())
            .finish()
    }
}

impl PackFilter {
    /// Create filter that packs everything
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Skip these names at any depth
    #[must_use]
    pub fn excluding<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.excluded_names.extend(names.into_iter().map(Into::into));
        self
    }

    /// Skip a name directly below the root
    #[must_use]
    pub fn excluding_at_root(mut self, name: impl Into<String>) -> Self {
        self.excluded_root_names.push(name.into());
        self
    }

    /// Only pack files modified after `instant`
    #[must_use]
    pub fn modified_after(mut self, instant: Option<SystemTime>) -> Self {
        self.modified_after = instant;
        self
    }

    /// Only pack files accepted by `whitelist`
    #[must_use]
    pub fn with_whitelist(mut self, whitelist: FileWhitelist) -> Self {
        self.whitelist = Some(whitelist);
        self
    }

    fn skips_name(&self, name: &OsStr, depth: usize) -> bool {
        let matches = |names: &[String]| names.iter().any(|n| OsStr::new(n) == name);
        matches(&self.excluded_names) || (depth == 1 && matches(&self.excluded_root_names))
    }

    fn admits_file(&self, path: &Path, modified: Option<SystemTime>) -> bool {
        if let (Some(after), Some(modified)) = (self.modified_after, modified) {
            if modified <= after {
                return false;
            }
        }
        self.whitelist.as_ref().map_or(true, |accept| accept(path))
    }
}

/// How an archive is written into a folder
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct UnpackPolicy {
    /// Clear the folder first
    pub wipe: bool,
    /// Marker file name; never deleted and never overwritten
    pub marker_filename: String,
    /// Names a wipe never deletes (at any depth)
    pub protected_names: Vec<String>,
    /// Report only, touch nothing
    pub dry_run: bool,
}

impl UnpackPolicy {
    fn protects(&self, name: &OsStr, top_level: bool) -> bool {
        (top_level && OsStr::new(&self.marker_filename) == name)
            || self.protected_names.iter().any(|n| OsStr::new(n) == name)
    }

    fn is_reserved_entry(&self, path: &Path) -> bool {
        !self.marker_filename.is_empty() && path == Path::new(&self.marker_filename)
    }
}

/// Result of a pack
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PackedArchive {
    pub bytes: Vec<u8>,
    /// Packed files, relative to the source root, in walk order
    pub files: Vec<PathBuf>,
}

impl PackedArchive {
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

/// Result of an unpack
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct UnpackReport {
    /// Paths removed by the wipe
    pub removed: Vec<PathBuf>,
    /// Files written, relative to the target
    pub written: Vec<PathBuf>,
}

/// Archive format
pub trait ArchiveCodec: Send + Sync {
    /// Pack the files of `source` selected by `filter`
    fn pack(&self, source: &Path, filter: &PackFilter) -> Result<PackedArchive, ArchiveError>;

    /// Write `archive` into `target` according to `policy`
    fn unpack(&self, archive: &[u8], target: &Path, policy: &UnpackPolicy) -> Result<UnpackReport, ArchiveError>;
}

/// Files of `source` selected by `filter`, as (absolute, relative) pairs in walk order
fn select_files(source: &Path, filter: &PackFilter) -> Result<Vec<(PathBuf, PathBuf)>, ArchiveError> {
    let mut selected = Vec::new();
    let walker = WalkDir::new(source)
        .sort_by(|a, b| a.file_name().cmp(b.file_name()))
        .into_iter()
        .filter_entry(|e| e.depth() == 0 || !filter.skips_name(e.file_name(), e.depth()));
    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                debug!(%err, root = %source.display(), "skipping path during pack");
                continue;
            }
        };
        // directories are implied by their files; links are not packed
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        let modified = entry.metadata().ok().and_then(|m| m.modified().ok());
        if !filter.admits_file(path, modified) {
            continue;
        }
        let rel = path
            .strip_prefix(source)
            .map_err(|e| ArchiveError::Format(e.to_string()))?
            .to_path_buf();
        selected.push((path.to_path_buf(), rel));
    }
    Ok(selected)
}

/// Zip entry name: `/`-separated, whatever the host separator
fn entry_name(rel: &Path) -> String {
    rel.components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}

fn format_error(err: ZipError) -> ArchiveError {
    ArchiveError::Format(err.to_string())
}

#[cfg(unix)]
fn file_mode(path: &Path) -> Option<u32> {
    use std::os::unix::fs::PermissionsExt;
    fs::metadata(path).ok().map(|m| m.permissions().mode() & 0o777)
}

#[cfg(not(unix))]
fn file_mode(_path: &Path) -> Option<u32> {
    None
}

#[cfg(unix)]
fn restore_mode(path: &Path, mode: Option<u32>) -> Result<(), ArchiveError> {
    use std::os::unix::fs::PermissionsExt;
    match mode.map(|m| m & 0o777) {
        Some(mode) if mode != 0 => fs::set_permissions(path, fs::Permissions::from_mode(mode))
            .map_err(|e| ArchiveError::io_error(path, e)),
        _ => Ok(()),
    }
}

#[cfg(not(unix))]
fn restore_mode(_path: &Path, _mode: Option<u32>) -> Result<(), ArchiveError> {
    Ok(())
}

/// Deflated zip
///
/// Unix permission bits travel with each entry, so an install hook stays
/// executable after a round trip through the server.
#[derive(Debug, Clone, Copy, Default)]
pub struct ZipCodec;

impl ArchiveCodec for ZipCodec {
    fn pack(&self, source: &Path, filter: &PackFilter) -> Result<PackedArchive, ArchiveError> {
        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        let mut files = Vec::new();
        for (path, rel) in select_files(source, filter)? {
            let content = fs::read(&path).map_err(|e| ArchiveError::io_error(&path, e))?;
            let mut options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
            if let Some(mode) = file_mode(&path) {
                options = options.unix_permissions(mode);
            }
            writer.start_file(entry_name(&rel), options).map_err(format_error)?;
            writer
                .write_all(&content)
                .map_err(|e| ArchiveError::io_error(&path, e))?;
            files.push(rel);
        }
        let bytes = writer.finish().map_err(format_error)?.into_inner();
        debug!(root = %source.display(), files = files.len(), bytes = bytes.len(), "packed");
        Ok(PackedArchive { bytes, files })
    }

    fn unpack(&self, archive: &[u8], target: &Path, policy: &UnpackPolicy) -> Result<UnpackReport, ArchiveError> {
        let mut zip = ZipArchive::new(Cursor::new(archive)).map_err(format_error)?;
        let mut report = UnpackReport::default();
        if !policy.dry_run {
            fs::create_dir_all(target).map_err(|e| ArchiveError::io_error(target, e))?;
        }
        if policy.wipe && target.is_dir() {
            wipe_dir(target, policy, true, &mut report.removed)?;
        }

        for index in 0..zip.len() {
            let mut entry = zip.by_index(index).map_err(format_error)?;
            let Some(path) = entry.enclosed_name() else {
                warn!(entry = entry.name(), "skipping entry outside target folder");
                continue;
            };
            if policy.is_reserved_entry(&path) {
                debug!(entry = %path.display(), "not overwriting marker");
                continue;
            }
            let dest = target.join(&path);
            if entry.is_dir() {
                if !policy.dry_run {
                    fs::create_dir_all(&dest).map_err(|e| ArchiveError::io_error(&dest, e))?;
                }
                continue;
            }
            if policy.dry_run {
                report.written.push(path);
                continue;
            }
            if let Some(parent) = dest.parent() {
                fs::create_dir_all(parent).map_err(|e| ArchiveError::io_error(parent, e))?;
            }
            let mut out = fs::File::create(&dest).map_err(|e| ArchiveError::io_error(&dest, e))?;
            std::io::copy(&mut entry, &mut out).map_err(|e| ArchiveError::io_error(&dest, e))?;
            restore_mode(&dest, entry.unix_mode())?;
            report.written.push(path);
        }
        debug!(
            target = %target.display(),
            removed = report.removed.len(),
            written = report.written.len(),
            dry_run = policy.dry_run,
            "unpacked"
        );
        Ok(report)
    }
}

/// Remove everything below `dir` that the policy does not protect
///
/// Returns whether `dir` ended up empty.
fn wipe_dir(dir: &Path, policy: &UnpackPolicy, top_level: bool, removed: &mut Vec<PathBuf>) -> Result<bool, ArchiveError> {
    let mut kept = false;
    let entries = fs::read_dir(dir).map_err(|e| ArchiveError::io_error(dir, e))?;
    for entry in entries {
        let entry = entry.map_err(|e| ArchiveError::io_error(dir, e))?;
        let path = entry.path();
        if policy.protects(&entry.file_name(), top_level) {
            kept = true;
            continue;
        }
        let file_type = entry.file_type().map_err(|e| ArchiveError::io_error(&path, e))?;
        if file_type.is_dir() {
            if wipe_dir(&path, policy, false, removed)? {
                if !policy.dry_run {
                    fs::remove_dir(&path).map_err(|e| ArchiveError::io_error(&path, e))?;
                }
                removed.push(path);
            } else {
                kept = true;
            }
        } else {
            if !policy.dry_run {
                fs::remove_file(&path).map_err(|e| ArchiveError::io_error(&path, e))?;
            }
            removed.push(path);
        }
    }
    Ok(!kept)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn write(root: &Path, rel: &str, content: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    fn policy(wipe: bool) -> UnpackPolicy {
        UnpackPolicy {
            wipe,
            marker_filename: ".rose".to_string(),
            protected_names: vec![".git".to_string()],
            dry_run: false,
        }
    }

    #[test]
    fn pack_skips_excluded_names_and_root_marker() {
        let src = tempfile::tempdir().unwrap();
        write(src.path(), "main.js", "x");
        write(src.path(), "lib/util.js", "y");
        write(src.path(), ".git/HEAD", "ref");
        write(src.path(), "node_modules/dep/index.js", "z");
        write(src.path(), ".rose", "{}");
        write(src.path(), "lib/.rose", "nested is packed");

        let filter = PackFilter::new()
            .excluding([".git", "node_modules"])
            .excluding_at_root(".rose");
        let packed = ZipCodec.pack(src.path(), &filter).unwrap();
        assert_eq!(
            packed.files,
            vec![PathBuf::from("lib/.rose"), PathBuf::from("lib/util.js"), PathBuf::from("main.js")]
        );
    }

    #[test]
    fn whitelist_and_mtime_filters() {
        let src = tempfile::tempdir().unwrap();
        write(src.path(), "keep.js", "//! directive");
        write(src.path(), "drop.js", "plain");
        let filter = PackFilter::new().with_whitelist(Arc::new(|p: &Path| p.ends_with("keep.js")));
        assert_eq!(ZipCodec.pack(src.path(), &filter).unwrap().files, vec![PathBuf::from("keep.js")]);

        let future = SystemTime::now() + std::time::Duration::from_secs(3600);
        let none = ZipCodec
            .pack(src.path(), &PackFilter::new().modified_after(Some(future)))
            .unwrap();
        assert!(none.is_empty());
    }

    #[test]
    fn wipe_keeps_marker_and_protected_names() {
        let src = tempfile::tempdir().unwrap();
        write(src.path(), "new.txt", "fresh");
        let packed = ZipCodec.pack(src.path(), &PackFilter::new()).unwrap();

        let dst = tempfile::tempdir().unwrap();
        write(dst.path(), ".rose", "marker");
        write(dst.path(), ".git/config", "keep");
        write(dst.path(), "old/stale.txt", "gone");
        write(dst.path(), "old.txt", "gone");

        let report = ZipCodec.unpack(&packed.bytes, dst.path(), &policy(true)).unwrap();
        assert_eq!(report.written, vec![PathBuf::from("new.txt")]);
        assert!(dst.path().join(".rose").exists());
        assert!(dst.path().join(".git/config").exists());
        assert!(!dst.path().join("old").exists());
        assert!(!dst.path().join("old.txt").exists());
        assert_eq!(fs::read_to_string(dst.path().join("new.txt")).unwrap(), "fresh");
    }

    #[test]
    fn merge_keeps_existing_files_and_never_overwrites_marker() {
        let src = tempfile::tempdir().unwrap();
        write(src.path(), ".rose", "from archive");
        write(src.path(), "a.txt", "new a");
        let packed = ZipCodec.pack(src.path(), &PackFilter::new()).unwrap();

        let dst = tempfile::tempdir().unwrap();
        write(dst.path(), ".rose", "local marker");
        write(dst.path(), "b.txt", "local b");
        ZipCodec.unpack(&packed.bytes, dst.path(), &policy(false)).unwrap();

        assert_eq!(fs::read_to_string(dst.path().join(".rose")).unwrap(), "local marker");
        assert_eq!(fs::read_to_string(dst.path().join("a.txt")).unwrap(), "new a");
        assert!(dst.path().join("b.txt").exists());
    }

    #[test]
    fn dry_run_touches_nothing() {
        let src = tempfile::tempdir().unwrap();
        write(src.path(), "a.txt", "a");
        let packed = ZipCodec.pack(src.path(), &PackFilter::new()).unwrap();

        let dst = tempfile::tempdir().unwrap();
        write(dst.path(), "old.txt", "old");
        let mut dry = policy(true);
        dry.dry_run = true;
        let report = ZipCodec.unpack(&packed.bytes, dst.path(), &dry).unwrap();
        assert_eq!(report.removed.len(), 1);
        assert_eq!(report.written, vec![PathBuf::from("a.txt")]);
        assert!(dst.path().join("old.txt").exists());
        assert!(!dst.path().join("a.txt").exists());
    }

    #[test]
    fn empty_zip_unpacks_to_nothing() {
        let mut empty = b"PK\x05\x06".to_vec();
        empty.extend([0_u8; 18]);
        let dst = tempfile::tempdir().unwrap();
        let report = ZipCodec.unpack(&empty, dst.path(), &policy(false)).unwrap();
        assert_eq!(report, UnpackReport::default());
        assert_eq!(fs::read_dir(dst.path()).unwrap().count(), 0);
    }

    #[test]
    fn empty_pack_is_a_valid_archive() {
        let src = tempfile::tempdir().unwrap();
        let packed = ZipCodec.pack(src.path(), &PackFilter::new()).unwrap();
        assert!(packed.is_empty());
        assert!(packed.bytes.starts_with(b"PK\x05\x06"));
    }

    #[test]
    fn nested_entries_use_forward_slashes() {
        let src = tempfile::tempdir().unwrap();
        write(src.path(), "cfg/robots/arm.json", "{}");
        let packed = ZipCodec.pack(src.path(), &PackFilter::new()).unwrap();
        let zip = ZipArchive::new(Cursor::new(packed.bytes)).unwrap();
        assert_eq!(zip.file_names().collect::<Vec<_>>(), vec!["cfg/robots/arm.json"]);
    }

    #[cfg(unix)]
    #[test]
    fn executable_bit_survives_round_trip() {
        use std::os::unix::fs::PermissionsExt;
        let src = tempfile::tempdir().unwrap();
        write(src.path(), ".rose_install", "#!/bin/sh\n");
        fs::set_permissions(src.path().join(".rose_install"), fs::Permissions::from_mode(0o755)).unwrap();
        let packed = ZipCodec.pack(src.path(), &PackFilter::new()).unwrap();

        let dst = tempfile::tempdir().unwrap();
        ZipCodec.unpack(&packed.bytes, dst.path(), &policy(false)).unwrap();
        let mode = fs::metadata(dst.path().join(".rose_install")).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o755);
    }

    #[test]
    fn garbage_is_a_format_error() {
        let dst = tempfile::tempdir().unwrap();
        let err = ZipCodec
            .unpack(b"plain text, no archive in sight", dst.path(), &policy(false))
            .unwrap_err();
        assert!(matches!(err, ArchiveError::Format(_)));
    }
}
