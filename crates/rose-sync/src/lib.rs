//! Rose Sync
//!
//! Keeps bound folders and the RoseStudio server consistent.
//!
//! # Core Concepts
//!
//! - [`Reconciler`]: detects drift between a binding's cached snapshot and
//!   the server; repairs or disconnects stale bindings
//! - [`SyncEngine`]: class upload (incremental, filtered) and instance
//!   download (class first, wipe or merge, install hook)
//! - [`Provisioner`]: creates or connects classes and instances through a
//!   validated, prompt-driven state machine
//! - [`ArchiveCodec`]: pack/unpack seam with the bundled [`ZipCodec`]
//! - [`Prompter`]: user decisions, supplied by the caller
//! - [`Settings`]: TOML configuration with environment overrides
//!
//! # Example
//!
//! ```rust,ignore
//! let engine = SyncEngine::new(api, Settings::load(None)?, Arc::new(NonInteractive::new(true)));
//! let report = engine.upload(Path::new("my-class"), &UploadOptions::default()).await?;
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

mod archive;
mod config;
mod error;
mod hook;
mod preprocessor;
mod prompt;
mod provisioning;
mod reconciler;
mod sync;

pub use archive::{
    ArchiveCodec, ArchiveError, FileWhitelist, PackFilter, PackedArchive, UnpackPolicy, UnpackReport,
    ZipCodec,
};
pub use config::{
    AuthSettings, FolderSettings, ServerSettings, Settings, SyncSettings, CONFIG_ENV,
    SERVER_URL_ENV,
};
pub use error::{ErrorCategory, SyncError, TransferError};
pub use hook::InstallHook;
pub use preprocessor::{file_has_template_markers, looks_binary, text_has_template_markers};
pub use prompt::{NonInteractive, Prompter};
pub use provisioning::{
    allowed_transitions, unique_labels, validate_class_name, validate_scenario_name,
    validate_transition, InstanceOptions, ProvisionReport, ProvisionStep, Provisioner,
    ScenarioOptions,
};
pub use reconciler::{CleanupSummary, Reconciler, RefreshOutcome};
pub use sync::{
    DownloadOptions, DownloadOutcome, DownloadReport, SyncEngine, UpdateReport, UploadOptions,
    UploadOutcome, UploadReport,
};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
