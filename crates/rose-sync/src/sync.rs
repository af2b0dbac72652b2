//! Sync engine
//!
//! Moves code between bound folders and the server:
//!
//! - **upload**: pack a class folder (incrementally, filtered) and send it;
//!   optionally cascade into a download of every bound instance
//! - **download**: upload the sibling class first, fetch generated code,
//!   extract it (wiping or merging) and start the install hook
//!
//! Every remote call and archive step runs strictly one after another.
//! A class is always uploaded before any of its instances is downloaded.

use crate::archive::{ArchiveCodec, ArchiveError, PackFilter, PackedArchive, UnpackPolicy, UnpackReport, ZipCodec};
use crate::config::Settings;
use crate::error::SyncError;
use crate::hook::InstallHook;
use crate::preprocessor::file_has_template_markers;
use crate::prompt::Prompter;
use crate::reconciler::Reconciler;
use chrono::Utc;
use parking_lot::Mutex;
use rose_folder::{normalize_path, Binding, FolderIndex, MarkerStore};
use rose_remote::ScenarioApi;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Options of an upload
#[derive(Debug, Clone, Default)]
pub struct UploadOptions {
    /// Pack every file, ignoring the last upload timestamp
    pub force: bool,
    /// Skip the class upload itself (only meaningful with `cascade`)
    pub instances_only: bool,
    /// Download every bound instance of the class afterwards
    pub cascade: bool,
    /// Refresh the binding from the server first
    pub check: bool,
    pub dry_run: bool,
    /// Options for the cascaded downloads
    pub download: DownloadOptions,
}

/// Options of a download
#[derive(Debug, Clone)]
pub struct DownloadOptions {
    /// Upload the bound class folder of an instance first
    pub class_update: bool,
    /// Clear the folder before extracting
    pub wipe: bool,
    /// Do not ask before wiping
    pub skip_confirmation: bool,
    /// Refresh the binding from the server first
    pub check: bool,
    pub dry_run: bool,
    /// Force the preceding class upload
    pub force_upload: bool,
}

impl Default for DownloadOptions {
    fn default() -> Self {
        Self {
            class_update: true,
            wipe: true,
            skip_confirmation: false,
            check: false,
            dry_run: false,
            force_upload: false,
        }
    }
}

/// What happened to a class upload
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadOutcome {
    Uploaded { files: Vec<PathBuf> },
    /// No file passed the filters
    NothingToUpload,
    /// Would have uploaded these files
    DryRun { files: Vec<PathBuf> },
    /// Class upload not requested
    Skipped,
}

/// Result of [`SyncEngine::upload`]
#[derive(Debug, Clone)]
pub struct UploadReport {
    pub folder: PathBuf,
    pub outcome: UploadOutcome,
    /// Downloads of the bound instances, in path order
    pub cascade: Vec<DownloadReport>,
}

/// What happened to a download
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DownloadOutcome {
    Extracted {
        written: Vec<PathBuf>,
        removed: Vec<PathBuf>,
        /// Files copied from the local class folder before the overlay
        copied_from_class: Option<usize>,
    },
    /// User declined the wipe; the folder is untouched
    Declined,
    /// Would have written and removed these paths
    DryRun {
        written: Vec<PathBuf>,
        removed: Vec<PathBuf>,
    },
}

/// Result of [`SyncEngine::download`]
#[derive(Debug, Clone)]
pub struct DownloadReport {
    pub folder: PathBuf,
    pub outcome: DownloadOutcome,
    /// Upload of the class folder that preceded the download
    pub class_upload: Option<UploadReport>,
    pub hook_started: bool,
}

/// Result of [`SyncEngine::update`]
#[derive(Debug, Clone)]
pub enum UpdateReport {
    Class(UploadReport),
    Instance(DownloadReport),
}

/// Orchestrates uploads and downloads for bound folders
pub struct SyncEngine {
    api: ScenarioApi,
    settings: Settings,
    store: MarkerStore,
    reconciler: Reconciler,
    codec: Arc<dyn ArchiveCodec>,
    prompter: Arc<dyn Prompter>,
    hook: InstallHook,
    root: PathBuf,
    hooks: Mutex<Vec<JoinHandle<()>>>,
}

impl fmt::Debug for SyncEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SyncEngine")
            .field("api", &self.api)
            .field("root", &self.root)
            .field("marker", &self.store.filename())
            .finish_non_exhaustive()
    }
}

impl SyncEngine {
    /// Create engine rooted at the current directory with the zip codec
    #[must_use]
    pub fn new(api: ScenarioApi, settings: Settings, prompter: Arc<dyn Prompter>) -> Self {
        let store = settings.marker_store();
        Self {
            reconciler: Reconciler::new(api.clone(), store.clone()),
            hook: InstallHook::new(&settings.folder.install_hook_filename),
            api,
            settings,
            store,
            codec: Arc::new(ZipCodec),
            prompter,
            root: PathBuf::from("."),
            hooks: Mutex::new(Vec::new()),
        }
    }

    /// Directory scanned for sibling bindings
    #[must_use]
    pub fn with_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.root = root.into();
        self
    }

    /// Use another archive format
    #[must_use]
    pub fn with_codec(mut self, codec: Arc<dyn ArchiveCodec>) -> Self {
        self.codec = codec;
        self
    }

    #[inline]
    #[must_use]
    pub fn api(&self) -> &ScenarioApi {
        &self.api
    }

    #[inline]
    #[must_use]
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    #[inline]
    #[must_use]
    pub fn store(&self) -> &MarkerStore {
        &self.store
    }

    #[inline]
    #[must_use]
    pub fn reconciler(&self) -> &Reconciler {
        &self.reconciler
    }

    #[inline]
    #[must_use]
    pub fn prompter(&self) -> &dyn Prompter {
        self.prompter.as_ref()
    }

    #[inline]
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Build a fresh folder index below the root
    pub fn scan(&self) -> Result<FolderIndex, SyncError> {
        Ok(FolderIndex::scan(&self.root, &self.store)?)
    }

    /// Upload a class folder, then optionally download its instances
    pub async fn upload(&self, folder: &Path, options: &UploadOptions) -> Result<UploadReport, SyncError> {
        let folder = normalize_path(folder);
        let mut binding = self.store.load(&folder)?;
        if options.check {
            self.reconciler.ensure_current(&folder, &mut binding).await?;
        }
        if !binding.is_class {
            return Err(SyncError::not_bound(
                &folder,
                format!(
                    "folder \"{}\" is connected to the scenario instance \"{}\"; only scenario class folders can be uploaded",
                    folder.display(),
                    binding.name()
                ),
            ));
        }

        let outcome = if options.instances_only {
            UploadOutcome::Skipped
        } else {
            self.upload_class(&folder, &mut binding, options.force, options.dry_run)
                .await?
        };

        let mut cascade = Vec::new();
        if options.cascade {
            let index = self.scan()?;
            let instances: Vec<PathBuf> = index
                .instances_of_class(binding.uuid())
                .into_iter()
                .map(|e| e.path.to_path_buf())
                .collect();
            debug!(class = binding.name(), instances = instances.len(), "cascading download");
            let download = DownloadOptions {
                class_update: false,
                dry_run: options.download.dry_run || options.dry_run,
                ..options.download.clone()
            };
            for instance in instances {
                cascade.push(self.download(&instance, &download).await?);
            }
        }

        Ok(UploadReport {
            folder,
            outcome,
            cascade,
        })
    }

    /// Fetch generated code into a bound folder
    pub async fn download(&self, folder: &Path, options: &DownloadOptions) -> Result<DownloadReport, SyncError> {
        let folder = normalize_path(folder);
        let mut binding = self.store.load(&folder)?;
        if options.check {
            self.reconciler.ensure_current(&folder, &mut binding).await?;
        }
        let index = self.scan()?;

        let class_upload = match index.class_of_instance(&folder) {
            Some(class) if options.class_update && !binding.is_class => {
                let class_folder = class.path.to_path_buf();
                let mut class_binding = class.binding.clone();
                let outcome = self
                    .upload_class(&class_folder, &mut class_binding, options.force_upload, options.dry_run)
                    .await?;
                Some(UploadReport {
                    folder: class_folder,
                    outcome,
                    cascade: Vec::new(),
                })
            }
            _ => None,
        };

        let class = match binding.class_uuid() {
            Some(class_uuid) => self.api.scenario(class_uuid).await?,
            None => self.api.scenario(binding.uuid()).await?,
        };
        if binding.is_class && class.is_local() {
            return Err(SyncError::not_bound(
                &folder,
                format!(
                    "scenario class \"{}\" is marked as \"local\"; code download is not supported for local scenario classes",
                    class.name()
                ),
            ));
        }
        let class_source = if !binding.is_class && class.is_local() {
            match index.find_uuid(class.uuid()).filter(|e| e.binding.is_class) {
                Some(entry) => Some(entry.path.to_path_buf()),
                None => {
                    return Err(SyncError::MissingSource {
                        instance: binding.name().to_string(),
                        class_name: class.name().to_string(),
                        class_uuid: class.uuid(),
                    })
                }
            }
        } else {
            None
        };

        if options.wipe && !options.skip_confirmation && !options.dry_run {
            let question = format!(
                "all files in \"{}\" will be replaced by the code of \"{}\"; continue?",
                folder.display(),
                binding.name()
            );
            if !self.prompter.confirm(&question, false)? {
                info!(folder = %folder.display(), "download declined");
                return Ok(DownloadReport {
                    folder,
                    outcome: DownloadOutcome::Declined,
                    class_upload,
                    hook_started: false,
                });
            }
        }

        let instance_uuid = (!binding.is_class).then(|| binding.uuid());
        let archive = self.api.request_code_archive(&class, instance_uuid).await?;

        let policy = self.unpack_policy(options.wipe, options.dry_run);
        let mut copied_from_class = None;
        let report = match class_source {
            Some(source) => {
                let base = self.pack(&source, self.base_filter()).await?;
                copied_from_class = Some(base.files.len());
                let mut report = self.unpack(base.bytes, &folder, policy.clone()).await?;
                let overlay = self
                    .unpack(archive, &folder, UnpackPolicy { wipe: false, ..policy })
                    .await?;
                merge_written(&mut report, overlay);
                report
            }
            None => self.unpack(archive, &folder, policy).await?,
        };

        if options.dry_run {
            return Ok(DownloadReport {
                folder,
                outcome: DownloadOutcome::DryRun {
                    written: report.written,
                    removed: report.removed,
                },
                class_upload,
                hook_started: false,
            });
        }
        info!(
            folder = %folder.display(),
            uuid = %binding.uuid(),
            written = report.written.len(),
            removed = report.removed.len(),
            "download complete"
        );

        let hook_started = match self.hook.spawn(&folder) {
            Some(handle) => {
                self.hooks.lock().push(handle);
                true
            }
            None => false,
        };
        Ok(DownloadReport {
            folder,
            outcome: DownloadOutcome::Extracted {
                written: report.written,
                removed: report.removed,
                copied_from_class,
            },
            class_upload,
            hook_started,
        })
    }

    /// Upload a class folder or download an instance folder
    ///
    /// Instance folders use `options.download`.
    pub async fn update(&self, folder: &Path, options: &UploadOptions) -> Result<UpdateReport, SyncError> {
        let binding = self.store.load(&normalize_path(folder))?;
        if binding.is_class {
            Ok(UpdateReport::Class(self.upload(folder, options).await?))
        } else {
            Ok(UpdateReport::Instance(self.download(folder, &options.download).await?))
        }
    }

    /// Wait for every install hook started so far
    pub async fn wait_for_hooks(&self) {
        let handles = std::mem::take(&mut *self.hooks.lock());
        for handle in handles {
            if let Err(err) = handle.await {
                warn!(error = %err, "install hook task panicked");
            }
        }
    }

    async fn upload_class(
        &self,
        folder: &Path,
        binding: &mut Binding,
        force: bool,
        dry_run: bool,
    ) -> Result<UploadOutcome, SyncError> {
        let started = Utc::now();
        // the cached snapshot may predate a switch to or from local code
        let remote = self.api.scenario(binding.uuid()).await?;
        let packed = self
            .pack(folder, self.upload_filter(binding, remote.is_local(), force))
            .await?;
        if packed.is_empty() {
            info!(folder = %folder.display(), "nothing to upload");
            return Ok(UploadOutcome::NothingToUpload);
        }
        if dry_run {
            return Ok(UploadOutcome::DryRun { files: packed.files });
        }

        self.api
            .upload_code_archive(binding.uuid(), packed.bytes)
            .await?;
        binding.last_upload_timestamp = Some(started);
        self.store.save(folder, binding)?;
        info!(
            folder = %folder.display(),
            uuid = %binding.uuid(),
            files = packed.files.len(),
            "class code uploaded"
        );
        Ok(UploadOutcome::Uploaded { files: packed.files })
    }

    fn base_filter(&self) -> PackFilter {
        PackFilter::new()
            .excluding(self.settings.sync.excluded_names.iter().cloned())
            .excluding_at_root(self.store.filename())
    }

    fn upload_filter(&self, binding: &Binding, is_local: bool, force: bool) -> PackFilter {
        let mut filter = self.base_filter();
        if !force {
            filter = filter.modified_after(binding.last_upload_timestamp.map(SystemTime::from));
        }
        if is_local {
            filter = filter.with_whitelist(Arc::new(|path: &Path| file_has_template_markers(path)));
        }
        filter
    }

    fn unpack_policy(&self, wipe: bool, dry_run: bool) -> UnpackPolicy {
        UnpackPolicy {
            wipe,
            marker_filename: self.store.filename().to_string(),
            protected_names: self.settings.sync.protected_names.clone(),
            dry_run,
        }
    }

    async fn pack(&self, dir: &Path, filter: PackFilter) -> Result<PackedArchive, SyncError> {
        let codec = Arc::clone(&self.codec);
        let dir = dir.to_path_buf();
        let packed = tokio::task::spawn_blocking(move || codec.pack(&dir, &filter))
            .await
            .map_err(|e| ArchiveError::Task(e.to_string()))??;
        Ok(packed)
    }

    async fn unpack(&self, archive: Vec<u8>, target: &Path, policy: UnpackPolicy) -> Result<UnpackReport, SyncError> {
        let codec = Arc::clone(&self.codec);
        let target = target.to_path_buf();
        let report = tokio::task::spawn_blocking(move || codec.unpack(&archive, &target, &policy))
            .await
            .map_err(|e| ArchiveError::Task(e.to_string()))??;
        Ok(report)
    }
}

fn merge_written(report: &mut UnpackReport, overlay: UnpackReport) {
    for path in overlay.written {
        if !report.written.contains(&path) {
            report.written.push(path);
        }
    }
    report.removed.extend(overlay.removed);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn download_defaults_are_destructive_with_class_update() {
        let options = DownloadOptions::default();
        assert!(options.class_update);
        assert!(options.wipe);
        assert!(!options.skip_confirmation);
        assert!(!UploadOptions::default().download.dry_run);
    }

    #[test]
    fn overlay_written_files_are_merged_once() {
        let mut base = UnpackReport {
            removed: vec![PathBuf::from("/x/old")],
            written: vec![PathBuf::from("a"), PathBuf::from("b")],
        };
        merge_written(
            &mut base,
            UnpackReport {
                removed: Vec::new(),
                written: vec![PathBuf::from("b"), PathBuf::from("c")],
            },
        );
        assert_eq!(base.written, vec![PathBuf::from("a"), PathBuf::from("b"), PathBuf::from("c")]);
        assert_eq!(base.removed.len(), 1);
    }
}
