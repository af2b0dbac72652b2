//! Binding refresh and cleanup against the fake server

use pretty_assertions::assert_eq;
use proptest::prelude::*;
use rose_folder::{FolderIndex, MarkerStore};
use rose_record::field;
use rose_sync::{ErrorCategory, RefreshOutcome, UploadOptions};
use rose_test_utils::{bind, engine_assuming_yes, write_file, MockTransport};
use serde_json::Value;
use std::ffi::OsStr;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

fn names(paths: &[PathBuf]) -> Vec<&OsStr> {
    paths.iter().filter_map(|p| p.file_name()).collect()
}

#[tokio::test]
async fn deleted_scenario_disconnects_the_folder_only() {
    let root = tempfile::tempdir().unwrap();
    let mock = Arc::new(MockTransport::new());
    let class = mock.add_class("Gone", false);
    let dir = root.path().join("gone");
    let mut binding = bind(&dir, &class);
    write_file(&dir, "main.js", "keep me");
    mock.remove(class.uuid());

    let engine = engine_assuming_yes(&mock, root.path());
    let outcome = engine.reconciler().refresh(&dir, &mut binding).await.unwrap();

    assert_eq!(outcome, RefreshOutcome::Disconnected);
    assert!(!MarkerStore::default().has_marker(&dir));
    assert_eq!(fs::read_to_string(dir.join("main.js")).unwrap(), "keep me");
}

#[tokio::test]
async fn renamed_scenario_rewrites_the_snapshot() {
    let root = tempfile::tempdir().unwrap();
    let mock = Arc::new(MockTransport::new());
    let class = mock.add_class("Old", false);
    let dir = root.path().join("old");
    let mut binding = bind(&dir, &class);
    mock.set_field(class.uuid(), field::NAME, Value::String("New".to_string()));

    let engine = engine_assuming_yes(&mock, root.path());
    let outcome = engine.reconciler().refresh(&dir, &mut binding).await.unwrap();

    assert_eq!(
        outcome,
        RefreshOutcome::Updated {
            changed_fields: vec![field::NAME]
        }
    );
    assert_eq!(binding.name(), "New");
    assert_eq!(MarkerStore::default().load(&dir).unwrap().name(), "New");

    let again = engine.reconciler().refresh(&dir, &mut binding).await.unwrap();
    assert_eq!(again, RefreshOutcome::Unchanged);
}

#[tokio::test]
async fn untracked_changes_leave_the_marker_alone() {
    let root = tempfile::tempdir().unwrap();
    let mock = Arc::new(MockTransport::new());
    let class = mock.add_class("Same", false);
    let dir = root.path().join("same");
    let mut binding = bind(&dir, &class);
    let before = fs::read_to_string(dir.join(".rose")).unwrap();
    mock.set_field(class.uuid(), field::MODIFIED_TIMESTAMP, Value::String("2026-10-01".to_string()));

    let engine = engine_assuming_yes(&mock, root.path());
    let outcome = engine.reconciler().refresh(&dir, &mut binding).await.unwrap();

    assert_eq!(outcome, RefreshOutcome::Unchanged);
    assert_eq!(fs::read_to_string(dir.join(".rose")).unwrap(), before);
}

#[tokio::test]
async fn checked_upload_of_deleted_class_is_stale() {
    let root = tempfile::tempdir().unwrap();
    let mock = Arc::new(MockTransport::new());
    let class = mock.add_class("Gone", false);
    let dir = root.path().join("gone");
    bind(&dir, &class);
    write_file(&dir, "main.js", "x");
    mock.remove(class.uuid());

    let engine = engine_assuming_yes(&mock, root.path());
    let options = UploadOptions {
        check: true,
        ..UploadOptions::default()
    };
    let err = engine.upload(&dir, &options).await.unwrap_err();

    assert_eq!(err.category(), ErrorCategory::StaleBinding);
    assert!(!err.is_failure());
    assert!(!MarkerStore::default().has_marker(&dir));
    assert!(mock.uploads().is_empty());
}

#[tokio::test]
async fn cleanup_reports_every_binding() {
    let root = tempfile::tempdir().unwrap();
    let mock = Arc::new(MockTransport::new());
    let kept = mock.add_class("Kept", false);
    let renamed = mock.add_class("Renamed", false);
    let gone = mock.add_class("Gone", false);
    bind(&root.path().join("a-kept"), &kept);
    bind(&root.path().join("b-renamed"), &renamed);
    bind(&root.path().join("c-gone"), &gone);
    mock.set_field(renamed.uuid(), field::NAME, Value::String("Renamed Again".to_string()));
    mock.remove(gone.uuid());

    let engine = engine_assuming_yes(&mock, root.path());
    let index = engine.scan().unwrap();
    let summary = engine.reconciler().cleanup_all(&index).await;

    assert_eq!(summary.checked(), 3);
    assert_eq!(names(&summary.unchanged), vec![OsStr::new("a-kept")]);
    assert_eq!(names(&summary.updated), vec![OsStr::new("b-renamed")]);
    assert_eq!(summary.disconnected.len(), 1);
    assert_eq!(summary.disconnected[0].1, "Gone");
    assert!(summary.failed.is_empty());

    let rescanned = FolderIndex::scan(root.path(), &MarkerStore::default()).unwrap();
    assert_eq!(rescanned.len(), 2);
}

#[tokio::test]
async fn cleanup_continues_past_server_errors() {
    let root = tempfile::tempdir().unwrap();
    let mock = Arc::new(MockTransport::new());
    let first = mock.add_class("First", false);
    let second = mock.add_class("Second", false);
    bind(&root.path().join("first"), &first);
    bind(&root.path().join("second"), &second);
    mock.fail_path("rest/connections", 503, "maintenance");

    let engine = engine_assuming_yes(&mock, root.path());
    let index = engine.scan().unwrap();
    let summary = engine.reconciler().cleanup_all(&index).await;

    assert_eq!(summary.failed.len(), 2);
    assert!(summary.failed.iter().all(|(_, e)| e.category() == ErrorCategory::Transfer));
    assert!(MarkerStore::default().has_marker(&root.path().join("first")));
    assert!(MarkerStore::default().has_marker(&root.path().join("second")));
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn refresh_settles_after_one_round(
        name in "[A-Za-z][A-Za-z0-9 ]{0,12}",
        renamed in proptest::option::of("[A-Za-z][A-Za-z0-9 ]{0,12}"),
        flip_local in any::<bool>(),
        touch_untracked in any::<bool>(),
    ) {
        let runtime = tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap();
        runtime.block_on(async {
            let root = tempfile::tempdir().unwrap();
            let mock = Arc::new(MockTransport::new());
            let class = mock.add_class(&name, false);
            let dir = root.path().join("bound");
            let mut binding = bind(&dir, &class);

            let mut expect_change = false;
            if let Some(new_name) = &renamed {
                mock.set_field(class.uuid(), field::NAME, Value::String(new_name.clone()));
                expect_change |= *new_name != name;
            }
            if flip_local {
                mock.set_field(class.uuid(), field::IS_LOCAL, Value::Bool(true));
                expect_change = true;
            }
            if touch_untracked {
                mock.set_field(class.uuid(), field::MODIFIED_TIMESTAMP, Value::String("2026-10-18".to_string()));
            }

            let engine = engine_assuming_yes(&mock, root.path());
            let first = engine.reconciler().refresh(&dir, &mut binding).await.unwrap();
            prop_assert_eq!(first.changed(), expect_change);

            let second = engine.reconciler().refresh(&dir, &mut binding).await.unwrap();
            prop_assert_eq!(second, RefreshOutcome::Unchanged);
            Ok(())
        })?;
    }
}
