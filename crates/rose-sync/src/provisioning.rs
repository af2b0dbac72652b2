//! Provisioning workflow
//!
//! Creates or connects scenario classes and instances for local folders.
//! Each run walks a small state machine:
//!
//! ```text
//! ChooseMode -> CreateFromFolder | BindExisting -> Validate -> Persist -> InitialSync -> Done
//!                      ^                                |
//!                      +------------ re-prompt ---------+
//! ```
//!
//! Input given up front (options) is validated once and rejected on
//! failure; input typed at a prompt is re-requested until it passes.
//! Nothing is created on the server before validation succeeds.

use crate::error::SyncError;
use crate::prompt::Prompter;
use crate::sync::{DownloadOptions, DownloadReport, SyncEngine, UploadOptions, UploadReport};
use rose_folder::{normalize_path, Binding, FolderIndex};
use rose_record::{field, looks_like_uuid, Record, ScenarioRecord};
use serde_json::Value;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Characters not allowed in scenario names
const INVALID_NAME_CHARS: [char; 16] = [
    '<', '>', '/', '\\', '[', ']', '{', '}', '#', '|', '&', ':', '(', ')', '"', '\'',
];

/// Step of the provisioning state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProvisionStep {
    ChooseMode,
    CreateFromFolder,
    BindExisting,
    Validate,
    Persist,
    InitialSync,
    Done,
}

/// Steps reachable from `from`
#[must_use]
pub fn allowed_transitions(from: ProvisionStep) -> Vec<ProvisionStep> {
    use ProvisionStep::*;
    match from {
        ChooseMode => vec![CreateFromFolder, BindExisting],
        CreateFromFolder | BindExisting => vec![Validate],
        Validate => vec![Persist, CreateFromFolder, BindExisting],
        Persist => vec![InitialSync, Done],
        InitialSync => vec![Done],
        Done => vec![],
    }
}

/// Validate a step transition
pub fn validate_transition(from: ProvisionStep, to: ProvisionStep) -> Result<(), SyncError> {
    if allowed_transitions(from).contains(&to) {
        Ok(())
    } else {
        Err(SyncError::Validation(format!(
            "illegal provisioning step {from:?} -> {to:?}"
        )))
    }
}

/// Check a proposed scenario name for characters unusable in paths
pub fn validate_scenario_name(name: &str) -> Result<(), String> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err("name must not be empty".to_string());
    }
    if trimmed == "." || trimmed == ".." || name.contains(INVALID_NAME_CHARS) || name.chars().any(char::is_control) {
        return Err(format!(
            "\"{name}\" is not a valid name; it must not contain any of < > / \\ [ ] {{ }} # | & : ( ) \" '"
        ));
    }
    Ok(())
}

/// Check a proposed class name: valid and not used by another class
pub fn validate_class_name(name: &str, classes: &[ScenarioRecord]) -> Result<(), String> {
    validate_scenario_name(name)?;
    if classes.iter().any(|c| c.name() == name) {
        return Err(format!("a scenario class with name \"{name}\" already exists"));
    }
    Ok(())
}

/// Labels for a selection list; repeated names get their uuid appended
#[must_use]
pub fn unique_labels(records: &[ScenarioRecord]) -> Vec<String> {
    records
        .iter()
        .enumerate()
        .map(|(i, r)| {
            let seen_before = records[..i].iter().any(|o| o.name() == r.name());
            if seen_before {
                format!("{} ({})", r.name(), r.uuid())
            } else {
                r.name().to_string()
            }
        })
        .collect()
}

/// Options of [`Provisioner::init_scenario`]
#[derive(Debug, Clone, Default)]
pub struct ScenarioOptions {
    /// Create a new class (skip the mode question)
    pub create: bool,
    /// Name or uuid of an existing class to connect (skip the mode question)
    pub existing: Option<String>,
    /// Name of the new class
    pub name: Option<String>,
    pub is_local: Option<bool>,
    /// Download the code of a connected class right away
    pub initial_sync: bool,
    /// Do not upload the folder of a newly created non-local class
    pub skip_initial_upload: bool,
}

/// Options of [`Provisioner::init_instance`]
#[derive(Debug, Clone, Default)]
pub struct InstanceOptions {
    pub create: bool,
    /// Name or uuid of an existing instance to connect
    pub existing: Option<String>,
    pub name: Option<String>,
    /// Folder for the instance; defaults to a sibling of the class folder
    pub folder: Option<PathBuf>,
    pub initial_sync: bool,
}

/// Result of a provisioning run
#[derive(Debug, Clone)]
pub struct ProvisionReport {
    pub folder: PathBuf,
    pub binding: Binding,
    /// A new record was created on the server
    pub created: bool,
    pub steps: Vec<ProvisionStep>,
    pub initial_upload: Option<UploadReport>,
    pub initial_download: Option<DownloadReport>,
}

struct Flow {
    step: ProvisionStep,
    trail: Vec<ProvisionStep>,
}

impl Flow {
    fn new() -> Self {
        Self {
            step: ProvisionStep::ChooseMode,
            trail: vec![ProvisionStep::ChooseMode],
        }
    }

    fn advance(&mut self, to: ProvisionStep) -> Result<(), SyncError> {
        validate_transition(self.step, to)?;
        debug!(from = ?self.step, to = ?to, "provisioning step");
        self.step = to;
        self.trail.push(to);
        Ok(())
    }
}

enum Mode {
    Create,
    Bind,
}

enum NameChoice {
    New(String),
    Existing(ScenarioRecord),
}

/// Interactive creation and connection of scenario folders
#[derive(Debug, Clone, Copy)]
pub struct Provisioner<'a> {
    engine: &'a SyncEngine,
}

impl<'a> Provisioner<'a> {
    #[must_use]
    pub fn new(engine: &'a SyncEngine) -> Self {
        Self { engine }
    }

    fn prompter(&self) -> &dyn Prompter {
        self.engine.prompter()
    }

    /// Connect `folder` to a new or existing scenario class
    pub async fn init_scenario(&self, folder: &Path, options: ScenarioOptions) -> Result<ProvisionReport, SyncError> {
        let folder = normalize_path(folder);
        self.ensure_unbound(&folder)?;
        let mut flow = Flow::new();
        let mode = self.choose_mode(
            options.create,
            options.existing.is_some(),
            "create a new scenario class",
            "connect to an existing scenario class",
        )?;
        let classes = self.engine.api().scenario_classes().await?;

        match mode {
            Mode::Create => {
                flow.advance(ProvisionStep::CreateFromFolder)?;
                let default_name = folder_name(&folder);
                let name = self.ask_valid(
                    &mut flow,
                    ProvisionStep::CreateFromFolder,
                    options.name.as_deref(),
                    "name of the new scenario class",
                    default_name.as_deref(),
                    |name| validate_class_name(name, &classes),
                )?;
                let is_local = match options.is_local {
                    Some(is_local) => is_local,
                    None => self.prompter().confirm(
                        "is this a local scenario class (code is never stored on the server)?",
                        false,
                    )?,
                };

                flow.advance(ProvisionStep::Persist)?;
                let mut record = Record::new();
                record.insert(field::NAME.to_string(), Value::String(name.clone()));
                record.insert(field::IS_LOCAL.to_string(), Value::Bool(is_local));
                let created = self.engine.api().create_class(&record).await?;
                self.persist(&folder, created)?;
                info!(folder = %folder.display(), name = %name, is_local, "scenario class created");

                let initial_upload = if !is_local && !options.skip_initial_upload {
                    flow.advance(ProvisionStep::InitialSync)?;
                    let upload = UploadOptions {
                        force: true,
                        ..UploadOptions::default()
                    };
                    Some(self.engine.upload(&folder, &upload).await?)
                } else {
                    None
                };
                flow.advance(ProvisionStep::Done)?;
                Ok(ProvisionReport {
                    binding: self.engine.store().load(&folder)?,
                    folder,
                    created: true,
                    steps: flow.trail,
                    initial_upload,
                    initial_download: None,
                })
            }
            Mode::Bind => {
                flow.advance(ProvisionStep::BindExisting)?;
                let index = self.engine.scan()?;
                let candidates: Vec<ScenarioRecord> = classes
                    .into_iter()
                    .filter(|c| !c.is_local() && !index.contains_uuid(c.uuid()))
                    .collect();
                let class = self.pick(
                    &candidates,
                    options.existing.as_deref(),
                    "scenario class to connect to",
                    "there is no scenario class left to connect to (local and already connected classes are not offered)",
                )?;
                flow.advance(ProvisionStep::Validate)?;
                flow.advance(ProvisionStep::Persist)?;
                self.persist(&folder, class)?;
                self.finish_bind(folder, flow, options.initial_sync, false).await
            }
        }
    }

    /// Create or connect an instance of the class bound to `class_folder`
    pub async fn init_instance(&self, class_folder: &Path, options: InstanceOptions) -> Result<ProvisionReport, SyncError> {
        let class_folder = normalize_path(class_folder);
        let mut class_binding = self.engine.store().load(&class_folder)?;
        if !class_binding.is_class {
            return Err(SyncError::not_bound(
                &class_folder,
                format!(
                    "folder \"{}\" is not connected to a scenario class",
                    class_folder.display()
                ),
            ));
        }
        self.engine
            .reconciler()
            .ensure_current(&class_folder, &mut class_binding)
            .await?;
        let class_uuid = class_binding.uuid();

        let mut flow = Flow::new();
        let mode = self.choose_mode(
            options.create,
            options.existing.is_some(),
            "create a new scenario instance",
            "connect to an existing scenario instance",
        )?;
        let instances = self.engine.api().instances_of(class_uuid).await?;
        let index = self.engine.scan()?;

        let instance = match mode {
            Mode::Create => {
                flow.advance(ProvisionStep::CreateFromFolder)?;
                let choice = self.ask_instance_name(
                    &mut flow,
                    options.name.as_deref(),
                    &instances,
                    &index,
                    class_binding.name(),
                )?;
                match choice {
                    NameChoice::Existing(record) => record,
                    NameChoice::New(name) => {
                        let folder = self.instance_folder(&class_folder, options.folder.as_deref(), &name)?;
                        flow.advance(ProvisionStep::Persist)?;
                        let created = self
                            .engine
                            .api()
                            .create_instance(class_uuid, &name, Record::new())
                            .await?;
                        self.persist(&folder, created)?;
                        info!(
                            folder = %folder.display(),
                            name = %name,
                            class = class_binding.name(),
                            "scenario instance created"
                        );
                        return self.finish_bind(folder, flow, options.initial_sync, true).await;
                    }
                }
            }
            Mode::Bind => {
                flow.advance(ProvisionStep::BindExisting)?;
                let candidates: Vec<ScenarioRecord> = instances
                    .iter()
                    .filter(|i| !index.contains_uuid(i.uuid()))
                    .cloned()
                    .collect();
                let record = self.pick(
                    &candidates,
                    options.existing.as_deref(),
                    "scenario instance to connect to",
                    &format!(
                        "there is no instance of \"{}\" left to connect to",
                        class_binding.name()
                    ),
                )?;
                flow.advance(ProvisionStep::Validate)?;
                record
            }
        };

        let folder = self.instance_folder(&class_folder, options.folder.as_deref(), instance.name())?;
        flow.advance(ProvisionStep::Persist)?;
        self.persist(&folder, instance)?;
        self.finish_bind(folder, flow, options.initial_sync, false).await
    }

    /// Ask for a new instance name
    ///
    /// A name already used within the class offers to connect to that
    /// instance instead.
    fn ask_instance_name(
        &self,
        flow: &mut Flow,
        preset: Option<&str>,
        instances: &[ScenarioRecord],
        index: &FolderIndex,
        class_name: &str,
    ) -> Result<NameChoice, SyncError> {
        let mut preset = preset.map(str::to_string);
        loop {
            let from_options = preset.is_some();
            let name = match preset.take() {
                Some(name) => name,
                None => self.prompter().input("name of the new scenario instance", None)?,
            };
            flow.advance(ProvisionStep::Validate)?;
            let problem = match validate_scenario_name(&name) {
                Err(msg) => msg,
                Ok(()) => match instances.iter().find(|i| i.name() == name) {
                    None => return Ok(NameChoice::New(name)),
                    Some(existing) => {
                        let question = format!(
                            "scenario instance \"{name}\" already exists for class \"{class_name}\"; connect to it instead?"
                        );
                        if !index.contains_uuid(existing.uuid()) && self.prompter().confirm(&question, true)? {
                            flow.advance(ProvisionStep::BindExisting)?;
                            flow.advance(ProvisionStep::Validate)?;
                            return Ok(NameChoice::Existing(existing.clone()));
                        }
                        format!("scenario instance name \"{name}\" is already taken")
                    }
                },
            };
            if from_options {
                return Err(SyncError::Validation(problem));
            }
            self.prompter().message(&problem);
            flow.advance(ProvisionStep::CreateFromFolder)?;
        }
    }

    fn choose_mode(&self, create: bool, existing: bool, create_label: &str, bind_label: &str) -> Result<Mode, SyncError> {
        if create {
            return Ok(Mode::Create);
        }
        if existing {
            return Ok(Mode::Bind);
        }
        let options = [create_label.to_string(), bind_label.to_string()];
        match self.prompter().select("what do you want to do?", &options)? {
            0 => Ok(Mode::Create),
            _ => Ok(Mode::Bind),
        }
    }

    /// Take a value from options or prompt for it until `check` accepts it
    fn ask_valid(
        &self,
        flow: &mut Flow,
        retry_step: ProvisionStep,
        preset: Option<&str>,
        question: &str,
        default: Option<&str>,
        check: impl Fn(&str) -> Result<(), String>,
    ) -> Result<String, SyncError> {
        if let Some(value) = preset {
            flow.advance(ProvisionStep::Validate)?;
            check(value).map_err(SyncError::Validation)?;
            return Ok(value.to_string());
        }
        loop {
            let value = self.prompter().input(question, default)?;
            flow.advance(ProvisionStep::Validate)?;
            match check(&value) {
                Ok(()) => return Ok(value),
                Err(msg) => {
                    self.prompter().message(&msg);
                    flow.advance(retry_step)?;
                }
            }
        }
    }

    /// Select a record by name or uuid, or by prompt
    fn pick(
        &self,
        candidates: &[ScenarioRecord],
        key: Option<&str>,
        question: &str,
        none_left: &str,
    ) -> Result<ScenarioRecord, SyncError> {
        if candidates.is_empty() {
            return Err(SyncError::Validation(none_left.to_string()));
        }
        if let Some(key) = key {
            let found = if looks_like_uuid(key) {
                candidates.iter().find(|c| c.uuid().to_string().eq_ignore_ascii_case(key))
            } else {
                candidates.iter().find(|c| c.name() == key)
            };
            return found.cloned().ok_or_else(|| {
                SyncError::Validation(format!("\"{key}\" is not among the scenarios available to connect to"))
            });
        }
        let labels = unique_labels(candidates);
        let index = self.prompter().select(question, &labels)?;
        candidates.get(index).cloned().ok_or(SyncError::Aborted)
    }

    fn instance_folder(&self, class_folder: &Path, preset: Option<&Path>, name: &str) -> Result<PathBuf, SyncError> {
        let folder = match preset {
            Some(folder) => normalize_path(folder),
            None => {
                let default = class_folder
                    .parent()
                    .unwrap_or(class_folder)
                    .join(name)
                    .display()
                    .to_string();
                let answer = self
                    .prompter()
                    .input("folder for the scenario instance", Some(&default))?;
                normalize_path(Path::new(&answer))
            }
        };
        self.ensure_unbound(&folder)?;
        Ok(folder)
    }

    /// Refuse folders that are bound or inside a bound folder
    fn ensure_unbound(&self, folder: &Path) -> Result<(), SyncError> {
        let store = self.engine.store();
        for dir in folder.ancestors() {
            if !store.has_marker(dir) {
                continue;
            }
            let name = store
                .load(dir)
                .map_or_else(|_| "?".to_string(), |b| b.name().to_string());
            let msg = if dir == folder {
                format!("folder \"{}\" is already connected to scenario \"{name}\"", folder.display())
            } else {
                format!(
                    "folder \"{}\" is inside folder \"{}\", which is connected to scenario \"{name}\"",
                    folder.display(),
                    dir.display()
                )
            };
            return Err(SyncError::Validation(msg));
        }
        Ok(())
    }

    fn persist(&self, folder: &Path, object: ScenarioRecord) -> Result<Binding, SyncError> {
        if !folder.is_dir() {
            std::fs::create_dir_all(folder).map_err(|e| SyncError::io_error(folder, e))?;
        }
        let binding = Binding::new(object);
        self.engine.store().save(folder, &binding)?;
        info!(folder = %folder.display(), uuid = %binding.uuid(), name = binding.name(), "folder connected");
        Ok(binding)
    }

    async fn finish_bind(
        &self,
        folder: PathBuf,
        mut flow: Flow,
        initial_sync: bool,
        created: bool,
    ) -> Result<ProvisionReport, SyncError> {
        let initial_download = if initial_sync {
            flow.advance(ProvisionStep::InitialSync)?;
            let download = DownloadOptions {
                wipe: false,
                skip_confirmation: true,
                ..DownloadOptions::default()
            };
            Some(self.engine.download(&folder, &download).await?)
        } else {
            None
        };
        flow.advance(ProvisionStep::Done)?;
        Ok(ProvisionReport {
            binding: self.engine.store().load(&folder)?,
            folder,
            created,
            steps: flow.trail,
            initial_upload: None,
            initial_download,
        })
    }
}

fn folder_name(folder: &Path) -> Option<String> {
    folder
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
}
