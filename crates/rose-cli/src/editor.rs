//! Editing JSON in the user's editor

use anyhow::{bail, Context, Result};
use rose_sync::{Prompter, SyncError};
use serde_json::Value;
use std::io::Write;
use std::path::Path;
use std::process::Command;

/// Result of one editing session
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Edited {
    Unchanged,
    Changed(Value),
}

/// `$EDITOR`, falling back to `vi`
fn editor_command() -> String {
    std::env::var("EDITOR")
        .ok()
        .filter(|e| !e.trim().is_empty())
        .unwrap_or_else(|| "vi".to_string())
}

/// Compare the edited text with the original and parse it when it changed
pub(crate) fn parse_edit(original: &str, edited: &str) -> Result<Edited, serde_json::Error> {
    if edited.trim() == original.trim() {
        return Ok(Edited::Unchanged);
    }
    serde_json::from_str(edited).map(Edited::Changed)
}

fn run_editor(path: &Path) -> Result<()> {
    let command = editor_command();
    let mut parts = command.split_whitespace();
    let program = parts.next().unwrap_or("vi");
    let status = Command::new(program)
        .args(parts)
        .arg(path)
        .status()
        .with_context(|| format!("could not start editor \"{command}\""))?;
    if !status.success() {
        bail!("editor \"{command}\" exited with {status}");
    }
    Ok(())
}

/// Open `value` as pretty JSON in the editor until it parses or the user gives up
///
/// Invalid JSON offers to reopen the edited text; declining aborts.
pub(crate) fn edit_json(value: &Value, prompter: &dyn Prompter) -> Result<Edited> {
    let original = serde_json::to_string_pretty(value)?;
    let mut file = tempfile::Builder::new()
        .prefix("rose-config-")
        .suffix(".json")
        .tempfile()
        .context("could not create a temporary file")?;
    file.write_all(original.as_bytes())?;
    file.flush()?;

    loop {
        run_editor(file.path())?;
        let edited = std::fs::read_to_string(file.path())
            .with_context(|| format!("could not read {}", file.path().display()))?;
        match parse_edit(&original, &edited) {
            Ok(result) => return Ok(result),
            Err(err) => {
                prompter.message(&format!("invalid JSON: {err}"));
                if !prompter.confirm("Open the editor again?", true)? {
                    return Err(SyncError::Aborted.into());
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn untouched_text_is_unchanged() {
        let original = serde_json::to_string_pretty(&json!({ "speed": 2 })).unwrap();
        assert_eq!(parse_edit(&original, &format!("{original}\n")).unwrap(), Edited::Unchanged);
    }

    #[test]
    fn edited_text_is_parsed() {
        let original = serde_json::to_string_pretty(&json!({ "speed": 2 })).unwrap();
        assert_eq!(
            parse_edit(&original, r#"{ "speed": 3 }"#).unwrap(),
            Edited::Changed(json!({ "speed": 3 }))
        );
    }

    #[test]
    fn broken_json_is_an_error() {
        assert!(parse_edit("{}", "{ speed: }").is_err());
    }
}
