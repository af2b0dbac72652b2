//! Per-shell token file
//!
//! `rose login` places a token pair at `<tmp>/rose-cli-token-<shell pid>.json`;
//! every command started from the same shell finds it there, and
//! `rose logout` deletes it.

use crate::error::HttpError;
use crate::session::TokenPair;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// File name prefix of token files
pub const TOKEN_FILE_PREFIX: &str = "rose-cli-token-";

/// Location of the token file of one shell
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenStore {
    path: PathBuf,
}

impl TokenStore {
    /// Store at an explicit path
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Token file of shell `pid` inside `dir`
    #[must_use]
    pub fn in_dir(dir: &Path, pid: u32) -> Self {
        Self::new(dir.join(format!("{TOKEN_FILE_PREFIX}{pid}.json")))
    }

    /// Token file of the shell this process was started from
    #[must_use]
    pub fn for_current_shell() -> Self {
        Self::in_dir(&std::env::temp_dir(), shell_pid())
    }

    #[inline]
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[inline]
    #[must_use]
    pub fn exists(&self) -> bool {
        self.path.is_file()
    }

    /// Read the token pair
    pub fn load(&self) -> Result<TokenPair, HttpError> {
        if !self.exists() {
            return Err(HttpError::NotLoggedIn(self.path.clone()));
        }
        read_tokens(&self.path)
    }

    /// Write the token pair, readable by the owner only
    pub fn save(&self, tokens: &TokenPair) -> Result<(), HttpError> {
        let text = serde_json::to_string_pretty(tokens).map_err(|e| HttpError::InvalidTokens {
            path: self.path.clone(),
            message: e.to_string(),
        })?;
        let mut file = open_private(&self.path).map_err(|e| HttpError::io_error(&self.path, e))?;
        file.write_all(text.as_bytes())
            .map_err(|e| HttpError::io_error(&self.path, e))?;
        debug!(path = %self.path.display(), "token file written");
        Ok(())
    }

    /// Copy a token file obtained elsewhere into this store
    ///
    /// Returns `false` without touching anything when already logged in and
    /// `force` is not set.
    pub fn install(&self, source: &Path, force: bool) -> Result<bool, HttpError> {
        if self.exists() && !force {
            return Ok(false);
        }
        let tokens = read_tokens(source)?;
        self.save(&tokens)?;
        info!(path = %self.path.display(), "logged in");
        Ok(true)
    }

    /// Delete the token file; `false` when there was none
    pub fn remove(&self) -> Result<bool, HttpError> {
        match fs::remove_file(&self.path) {
            Ok(()) => {
                info!(path = %self.path.display(), "logged out");
                Ok(true)
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(err) => Err(HttpError::io_error(&self.path, err)),
        }
    }
}

fn read_tokens(path: &Path) -> Result<TokenPair, HttpError> {
    let text = fs::read_to_string(path).map_err(|e| HttpError::io_error(path, e))?;
    let tokens: TokenPair = serde_json::from_str(&text).map_err(|e| HttpError::InvalidTokens {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;
    if tokens.access_token.is_empty() {
        return Err(HttpError::InvalidTokens {
            path: path.to_path_buf(),
            message: "access_token is empty".to_string(),
        });
    }
    Ok(tokens)
}

#[cfg(unix)]
fn open_private(path: &Path) -> std::io::Result<fs::File> {
    use std::os::unix::fs::OpenOptionsExt;
    fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o600)
        .open(path)
}

#[cfg(not(unix))]
fn open_private(path: &Path) -> std::io::Result<fs::File> {
    fs::File::create(path)
}

#[cfg(unix)]
fn shell_pid() -> u32 {
    std::os::unix::process::parent_id()
}

#[cfg(not(unix))]
fn shell_pid() -> u32 {
    std::process::id()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn write_tokens(path: &Path, access: &str) {
        fs::write(
            path,
            format!(r#"{{ "access_token": "{access}", "refresh_token": "r1", "token_type": "Bearer" }}"#),
        )
        .unwrap();
    }

    #[test]
    fn file_name_contains_shell_pid() {
        let store = TokenStore::in_dir(Path::new("/tmp"), 4242);
        assert_eq!(store.path(), Path::new("/tmp/rose-cli-token-4242.json"));
    }

    #[test]
    fn load_without_login() {
        let dir = tempfile::tempdir().unwrap();
        let store = TokenStore::in_dir(dir.path(), 1);
        assert!(matches!(store.load(), Err(HttpError::NotLoggedIn(_))));
    }

    #[test]
    fn install_then_logout() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("tokens.json");
        write_tokens(&source, "a1");
        let store = TokenStore::in_dir(dir.path(), 7);

        assert!(store.install(&source, false).unwrap());
        let tokens = store.load().unwrap();
        assert_eq!(tokens.access_token, "a1");
        assert_eq!(tokens.extra["token_type"], "Bearer");

        write_tokens(&source, "a2");
        assert!(!store.install(&source, false).unwrap());
        assert_eq!(store.load().unwrap().access_token, "a1");
        assert!(store.install(&source, true).unwrap());
        assert_eq!(store.load().unwrap().access_token, "a2");

        assert!(store.remove().unwrap());
        assert!(!store.remove().unwrap());
        assert!(!store.exists());
    }

    #[test]
    fn garbage_is_rejected_on_install() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("tokens.json");
        fs::write(&source, "not json").unwrap();
        let store = TokenStore::in_dir(dir.path(), 9);
        assert!(matches!(store.install(&source, false), Err(HttpError::InvalidTokens { .. })));
        assert!(!store.exists());
    }

    #[cfg(unix)]
    #[test]
    fn token_file_is_private() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempfile::tempdir().unwrap();
        let store = TokenStore::in_dir(dir.path(), 3);
        store.save(&TokenPair::new("a", None)).unwrap();
        let mode = fs::metadata(store.path()).unwrap().permissions().mode();
        assert_eq!(mode & 0o077, 0);
    }
}
