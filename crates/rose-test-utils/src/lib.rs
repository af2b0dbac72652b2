//! Testing utilities for the Rose workspace
//!
//! Shared fakes and fixtures for integration tests.

#![allow(missing_docs)]

mod fixtures;
mod mock;
mod prompter;

pub use fixtures::{bind, touch_later, write_file, zip_archive};
pub use mock::{MockTransport, RecordedCall};
pub use prompter::{Answer, ScriptedPrompter};

use rose_remote::ScenarioApi;
use rose_sync::{Prompter, Settings, SyncEngine};
use std::path::Path;
use std::sync::Arc;

/// Engine over the fake server, rooted at `root`, with default settings
pub fn engine(mock: &Arc<MockTransport>, prompter: Arc<dyn Prompter>, root: &Path) -> SyncEngine {
    let api = ScenarioApi::new(mock.clone());
    SyncEngine::new(api, Settings::default(), prompter).with_root(root)
}

/// Engine that answers every confirmation with yes
pub fn engine_assuming_yes(mock: &Arc<MockTransport>, root: &Path) -> SyncEngine {
    engine(mock, Arc::new(rose_sync::NonInteractive::new(true)), root)
}
