//! Interactive prompting seam
//!
//! Provisioning and destructive downloads ask the user questions through a
//! [`Prompter`]. The terminal implementation lives in the binary; tests use
//! scripted answers.

use crate::error::SyncError;

/// Source of user decisions
///
/// Cancelling a prompt yields [`SyncError::Aborted`].
pub trait Prompter: Send + Sync {
    /// Yes/no question
    fn confirm(&self, message: &str, default: bool) -> Result<bool, SyncError>;

    /// Pick one of `options`, returning its index
    fn select(&self, message: &str, options: &[String]) -> Result<usize, SyncError>;

    /// Free text
    fn input(&self, message: &str, default: Option<&str>) -> Result<String, SyncError>;

    /// Show a message (e.g. why the previous answer was rejected)
    fn message(&self, _text: &str) {}
}

/// Prompter for non-interactive runs
///
/// Confirmations get a fixed answer; questions that need real input abort.
#[derive(Debug, Clone, Copy, Default)]
pub struct NonInteractive {
    pub assume_yes: bool,
}

impl NonInteractive {
    #[must_use]
    pub fn new(assume_yes: bool) -> Self {
        Self { assume_yes }
    }
}

impl Prompter for NonInteractive {
    fn confirm(&self, _message: &str, _default: bool) -> Result<bool, SyncError> {
        Ok(self.assume_yes)
    }

    fn select(&self, message: &str, _options: &[String]) -> Result<usize, SyncError> {
        tracing::warn!(prompt = message, "selection needed but running non-interactively");
        Err(SyncError::Aborted)
    }

    fn input(&self, message: &str, default: Option<&str>) -> Result<String, SyncError> {
        match default {
            Some(value) if self.assume_yes => Ok(value.to_string()),
            _ => {
                tracing::warn!(prompt = message, "input needed but running non-interactively");
                Err(SyncError::Aborted)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn non_interactive_answers() {
        let yes = NonInteractive::new(true);
        assert!(yes.confirm("wipe?", false).unwrap());
        assert_eq!(yes.input("name", Some("Demo")).unwrap(), "Demo");
        assert!(matches!(yes.select("pick", &["a".to_string()]), Err(SyncError::Aborted)));

        let no = NonInteractive::default();
        assert!(!no.confirm("wipe?", true).unwrap());
        assert!(no.input("name", Some("Demo")).is_err());
    }
}
