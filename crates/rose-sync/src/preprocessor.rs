//! Template marker detection
//!
//! Local scenario classes only upload files that contain template
//! markers: a `//!` directive line, or a `$${...}` substitution.

use once_cell::sync::Lazy;
use regex::Regex;
use std::fs;
use std::path::Path;

static DIRECTIVE_LINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*//!\s*(.*)\s*$").expect("static pattern"));

static SUBSTITUTION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\$(\$\{[^}]*\})").expect("static pattern"));

/// Number of leading bytes inspected for binary content
const BINARY_PROBE_LEN: usize = 8000;

/// Check if text contains template markers
#[must_use]
pub fn text_has_template_markers(text: &str) -> bool {
    text.lines()
        .any(|line| DIRECTIVE_LINE.is_match(line) || SUBSTITUTION.is_match(line))
}

/// Check if bytes look like binary content (a NUL in the leading bytes)
#[must_use]
pub fn looks_binary(bytes: &[u8]) -> bool {
    bytes[..bytes.len().min(BINARY_PROBE_LEN)].contains(&0)
}

/// Check if a file is a text file containing template markers
///
/// Unreadable, binary and non-UTF-8 files never match.
#[must_use]
pub fn file_has_template_markers(path: &Path) -> bool {
    let Ok(bytes) = fs::read(path) else {
        return false;
    };
    if looks_binary(&bytes) {
        return false;
    }
    std::str::from_utf8(&bytes).is_ok_and(text_has_template_markers)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn directive_lines() {
        assert!(text_has_template_markers("const a = 1;\n  //! if robot.arm\n"));
        assert!(!text_has_template_markers("// just a comment\n/// doc\n"));
    }

    #[test]
    fn substitutions() {
        assert!(text_has_template_markers("host = \"$${robot.host}\""));
        assert!(!text_has_template_markers("host = \"${robot.host}\""));
    }

    #[test]
    fn binary_files_never_match() {
        let dir = tempfile::tempdir().unwrap();
        let bin = dir.path().join("blob.bin");
        fs::write(&bin, b"//! x\n\0\x01\x02").unwrap();
        assert!(!file_has_template_markers(&bin));

        let text = dir.path().join("main.js");
        fs::write(&text, "//! x\n").unwrap();
        assert!(file_has_template_markers(&text));
        assert!(!file_has_template_markers(&dir.path().join("missing")));
    }
}
