//! Class upload against the fake server

use chrono::Utc;
use pretty_assertions::assert_eq;
use rose_folder::MarkerStore;
use rose_record::field;
use rose_sync::{
    ArchiveCodec, ErrorCategory, UnpackPolicy, UploadOptions, UploadOutcome, ZipCodec,
};
use rose_test_utils::{bind, engine_assuming_yes, touch_later, write_file, MockTransport};
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;

fn files(names: &[&str]) -> Vec<PathBuf> {
    names.iter().map(PathBuf::from).collect()
}

fn unpacked_files(archive: &[u8]) -> Vec<PathBuf> {
    let dir = tempfile::tempdir().unwrap();
    ZipCodec
        .unpack(archive, dir.path(), &UnpackPolicy::default())
        .unwrap()
        .written
}

#[tokio::test]
async fn first_upload_packs_the_full_filtered_tree() {
    let root = tempfile::tempdir().unwrap();
    let mock = Arc::new(MockTransport::new());
    let class = mock.add_class("Fetch", false);
    let dir = root.path().join("fetch");
    bind(&dir, &class);
    write_file(&dir, "main.js", "run()");
    write_file(&dir, "lib/util.js", "export {}");
    write_file(&dir, ".git/HEAD", "ref: main");
    write_file(&dir, "node_modules/dep/index.js", "dep");

    let engine = engine_assuming_yes(&mock, root.path());
    let started = Utc::now();
    let report = engine.upload(&dir, &UploadOptions::default()).await.unwrap();

    assert_eq!(
        report.outcome,
        UploadOutcome::Uploaded {
            files: files(&["lib/util.js", "main.js"])
        }
    );
    let binding = MarkerStore::default().load(&dir).unwrap();
    assert!(binding.last_upload_timestamp.unwrap() >= started);

    let uploads = mock.uploads();
    assert_eq!(uploads.len(), 1);
    assert_eq!(uploads[0].0, class.uuid());
    assert_eq!(unpacked_files(&uploads[0].1), files(&["lib/util.js", "main.js"]));
}

#[tokio::test]
async fn second_upload_without_changes_packs_nothing() {
    let root = tempfile::tempdir().unwrap();
    let mock = Arc::new(MockTransport::new());
    let class = mock.add_class("Fetch", false);
    let dir = root.path().join("fetch");
    bind(&dir, &class);
    write_file(&dir, "main.js", "run()");
    let engine = engine_assuming_yes(&mock, root.path());

    engine.upload(&dir, &UploadOptions::default()).await.unwrap();
    let again = engine.upload(&dir, &UploadOptions::default()).await.unwrap();

    assert_eq!(again.outcome, UploadOutcome::NothingToUpload);
    assert_eq!(mock.uploads().len(), 1);
}

#[tokio::test]
async fn later_changes_are_uploaded_alone_unless_forced() {
    let root = tempfile::tempdir().unwrap();
    let mock = Arc::new(MockTransport::new());
    let class = mock.add_class("Fetch", false);
    let dir = root.path().join("fetch");
    bind(&dir, &class);
    write_file(&dir, "a.js", "a");
    write_file(&dir, "b.js", "b");
    let engine = engine_assuming_yes(&mock, root.path());
    engine.upload(&dir, &UploadOptions::default()).await.unwrap();

    write_file(&dir, "b.js", "b2");
    touch_later(&dir.join("b.js"), 60);
    let incremental = engine.upload(&dir, &UploadOptions::default()).await.unwrap();
    assert_eq!(incremental.outcome, UploadOutcome::Uploaded { files: files(&["b.js"]) });

    let forced = UploadOptions {
        force: true,
        ..UploadOptions::default()
    };
    let full = engine.upload(&dir, &forced).await.unwrap();
    assert_eq!(full.outcome, UploadOutcome::Uploaded { files: files(&["a.js", "b.js"]) });
}

#[tokio::test]
async fn local_class_uploads_only_template_files() {
    let root = tempfile::tempdir().unwrap();
    let mock = Arc::new(MockTransport::new());
    let class = mock.add_class("Tpl", true);
    let dir = root.path().join("tpl");
    bind(&dir, &class);
    write_file(&dir, "main.js", "//! if robot.arm\nmove()\n");
    write_file(&dir, "config.yaml", "host: $${robot.host}\n");
    write_file(&dir, "notes.md", "plain text");
    std::fs::write(dir.join("blob.bin"), b"//! x\0\x01").unwrap();

    let engine = engine_assuming_yes(&mock, root.path());
    let report = engine.upload(&dir, &UploadOptions::default()).await.unwrap();

    assert_eq!(
        report.outcome,
        UploadOutcome::Uploaded {
            files: files(&["config.yaml", "main.js"])
        }
    );
}

#[tokio::test]
async fn template_whitelist_follows_the_server_record() {
    let root = tempfile::tempdir().unwrap();
    let mock = Arc::new(MockTransport::new());
    let class = mock.add_class("Tpl", false);
    let dir = root.path().join("tpl");
    bind(&dir, &class);
    write_file(&dir, "main.js", "//! if robot.arm\nmove()\n");
    write_file(&dir, "notes.md", "plain text");
    mock.set_field(class.uuid(), field::IS_LOCAL, Value::Bool(true));

    let engine = engine_assuming_yes(&mock, root.path());
    let report = engine.upload(&dir, &UploadOptions::default()).await.unwrap();

    assert!(!MarkerStore::default().load(&dir).unwrap().is_local());
    assert_eq!(report.outcome, UploadOutcome::Uploaded { files: files(&["main.js"]) });
    assert_eq!(unpacked_files(&mock.uploads()[0].1), files(&["main.js"]));
}

#[tokio::test]
async fn instance_folders_cannot_be_uploaded() {
    let root = tempfile::tempdir().unwrap();
    let mock = Arc::new(MockTransport::new());
    let class = mock.add_class("Fetch", false);
    let instance = mock.add_instance(&class, "Fetch A");
    let dir = root.path().join("fetch-a");
    bind(&dir, &instance);
    write_file(&dir, "main.js", "x");

    let engine = engine_assuming_yes(&mock, root.path());
    let err = engine.upload(&dir, &UploadOptions::default()).await.unwrap_err();
    assert_eq!(err.category(), ErrorCategory::NotBound);

    let unbound = root.path().join("plain");
    std::fs::create_dir_all(&unbound).unwrap();
    let err = engine.upload(&unbound, &UploadOptions::default()).await.unwrap_err();
    assert_eq!(err.category(), ErrorCategory::NotBound);
    assert!(mock.uploads().is_empty());
}

#[tokio::test]
async fn dry_run_sends_and_records_nothing() {
    let root = tempfile::tempdir().unwrap();
    let mock = Arc::new(MockTransport::new());
    let class = mock.add_class("Fetch", false);
    let dir = root.path().join("fetch");
    bind(&dir, &class);
    write_file(&dir, "main.js", "x");

    let engine = engine_assuming_yes(&mock, root.path());
    let options = UploadOptions {
        dry_run: true,
        ..UploadOptions::default()
    };
    let report = engine.upload(&dir, &options).await.unwrap();

    assert_eq!(report.outcome, UploadOutcome::DryRun { files: files(&["main.js"]) });
    assert!(mock.uploads().is_empty());
    assert!(MarkerStore::default().load(&dir).unwrap().last_upload_timestamp.is_none());
}

#[tokio::test]
async fn failed_transfer_keeps_the_old_timestamp() {
    let root = tempfile::tempdir().unwrap();
    let mock = Arc::new(MockTransport::new());
    let class = mock.add_class("Fetch", false);
    let dir = root.path().join("fetch");
    bind(&dir, &class);
    write_file(&dir, "main.js", "x");
    mock.fail_path("binary/zip", 500, "disk full");

    let engine = engine_assuming_yes(&mock, root.path());
    let err = engine.upload(&dir, &UploadOptions::default()).await.unwrap_err();
    assert_eq!(err.category(), ErrorCategory::Transfer);
    assert!(err.to_string().contains("disk full"));
    assert!(MarkerStore::default().load(&dir).unwrap().last_upload_timestamp.is_none());
}
