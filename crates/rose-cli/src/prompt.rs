//! Terminal prompter

use colored::Colorize;
use inquire::{Confirm, InquireError, Select, Text};
use rose_sync::{Prompter, SyncError};

/// [`Prompter`] asking on the terminal
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct InquirePrompter;

fn aborted(err: InquireError) -> SyncError {
    match err {
        InquireError::OperationCanceled | InquireError::OperationInterrupted => {}
        other => tracing::warn!(error = %other, "prompt failed"),
    }
    SyncError::Aborted
}

impl Prompter for InquirePrompter {
    fn confirm(&self, message: &str, default: bool) -> Result<bool, SyncError> {
        Confirm::new(message)
            .with_default(default)
            .prompt()
            .map_err(aborted)
    }

    fn select(&self, message: &str, options: &[String]) -> Result<usize, SyncError> {
        Select::new(message, options.to_vec())
            .raw_prompt()
            .map(|choice| choice.index)
            .map_err(aborted)
    }

    fn input(&self, message: &str, default: Option<&str>) -> Result<String, SyncError> {
        let mut text = Text::new(message);
        if let Some(default) = default {
            text = text.with_default(default);
        }
        text.prompt().map_err(aborted)
    }

    fn message(&self, text: &str) {
        eprintln!("{}", text.yellow());
    }
}
