//! Prompter answering from a script

use parking_lot::Mutex;
use rose_sync::{Prompter, SyncError};
use std::collections::VecDeque;

/// One scripted answer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Answer {
    Confirm(bool),
    Select(usize),
    Input(String),
    /// Behave like a cancelled prompt
    Cancel,
}

impl Answer {
    /// Input answer
    #[must_use]
    pub fn input(text: &str) -> Self {
        Self::Input(text.to_string())
    }
}

/// Answers prompts in order and records what was asked
///
/// Panics when a prompt does not match the next scripted answer, so a test
/// fails at the first unexpected question.
#[derive(Debug, Default)]
pub struct ScriptedPrompter {
    answers: Mutex<VecDeque<Answer>>,
    asked: Mutex<Vec<String>>,
    messages: Mutex<Vec<String>>,
}

impl ScriptedPrompter {
    #[must_use]
    pub fn new(answers: impl IntoIterator<Item = Answer>) -> Self {
        Self {
            answers: Mutex::new(answers.into_iter().collect()),
            ..Self::default()
        }
    }

    /// Questions asked so far
    #[must_use]
    pub fn asked(&self) -> Vec<String> {
        self.asked.lock().clone()
    }

    /// Messages shown so far
    #[must_use]
    pub fn messages(&self) -> Vec<String> {
        self.messages.lock().clone()
    }

    /// Answers not consumed yet
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.answers.lock().len()
    }

    fn next(&self, question: &str) -> Answer {
        self.asked.lock().push(question.to_string());
        self.answers
            .lock()
            .pop_front()
            .unwrap_or_else(|| panic!("no scripted answer left for prompt: {question}"))
    }
}

impl Prompter for ScriptedPrompter {
    fn confirm(&self, message: &str, _default: bool) -> Result<bool, SyncError> {
        match self.next(message) {
            Answer::Confirm(yes) => Ok(yes),
            Answer::Cancel => Err(SyncError::Aborted),
            other => panic!("expected a confirm answer for {message:?}, script has {other:?}"),
        }
    }

    fn select(&self, message: &str, options: &[String]) -> Result<usize, SyncError> {
        match self.next(message) {
            Answer::Select(index) => {
                assert!(index < options.len(), "scripted index {index} out of range for {options:?}");
                Ok(index)
            }
            Answer::Cancel => Err(SyncError::Aborted),
            other => panic!("expected a select answer for {message:?}, script has {other:?}"),
        }
    }

    fn input(&self, message: &str, _default: Option<&str>) -> Result<String, SyncError> {
        match self.next(message) {
            Answer::Input(text) => Ok(text),
            Answer::Cancel => Err(SyncError::Aborted),
            other => panic!("expected an input answer for {message:?}, script has {other:?}"),
        }
    }

    fn message(&self, text: &str) {
        self.messages.lock().push(text.to_string());
    }
}
