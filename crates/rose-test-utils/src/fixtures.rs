//! Fixtures: archives, files and bound folders

use rose_folder::{Binding, MarkerStore};
use rose_record::ScenarioRecord;
use std::fs;
use std::io::{Cursor, Write};
use std::path::Path;
use std::time::SystemTime;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

/// Build a zip archive from `(path, content)` pairs
#[must_use]
pub fn zip_archive(entries: &[(&str, &str)]) -> Vec<u8> {
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    for (path, content) in entries {
        let options = SimpleFileOptions::default()
            .compression_method(CompressionMethod::Deflated)
            .unix_permissions(0o644);
        writer.start_file(*path, options).expect("start zip entry");
        writer.write_all(content.as_bytes()).expect("write zip entry");
    }
    writer.finish().expect("finish zip").into_inner()
}

/// Write a file, creating parent directories
pub fn write_file(root: &Path, rel: &str, content: &str) {
    let path = root.join(rel);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).expect("create parent dirs");
    }
    fs::write(&path, content).expect("write fixture file");
}

/// Create `dir` and bind it to `object` with the default marker name
pub fn bind(dir: &Path, object: &ScenarioRecord) -> Binding {
    fs::create_dir_all(dir).expect("create bound dir");
    let binding = Binding::new(object.clone());
    MarkerStore::default()
        .save(dir, &binding)
        .expect("write marker");
    binding
}

/// Push a file's modification time into the future
pub fn touch_later(path: &Path, seconds: u64) {
    let later = SystemTime::now() + std::time::Duration::from_secs(seconds);
    let file = fs::OpenOptions::new()
        .write(true)
        .open(path)
        .expect("open for touch");
    file.set_modified(later).expect("set mtime");
}
